/// Deployment errors
use std::path::PathBuf;

use crate::runtime::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stack file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid stack configuration: {0}")]
    Invalid(String),

    #[error("Group '{group}' needs service '{service}', which is not defined")]
    MissingService { group: String, service: String },

    #[error("Unknown group '{0}'")]
    UnknownGroup(String),

    #[error("Step '{step}' failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: RuntimeError,
    },

    #[error("{probe} not ready after {waited_secs}s")]
    ReadinessTimeout { probe: String, waited_secs: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type DeployResult<T> = Result<T, DeployError>;
