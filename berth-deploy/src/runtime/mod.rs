/// Container runtime seam
///
/// Everything the deploy harness does to containers goes through
/// [`ContainerRuntime`]. [`DockerCli`] drives the docker binary;
/// [`MockRuntime`] records calls for tests.
///
/// # Run Semantics
///
/// ```text
/// run(descriptor)
///   ├─> running with that name  -> AlreadyRunning, untouched
///   ├─> exists but stopped      -> remove, create -> Recreated
///   └─> missing                 -> create         -> Created
/// ```

pub mod docker;
pub mod mock;

pub use docker::DockerCli;
pub use mock::{MockCall, MockRuntime};

use std::fmt;

use async_trait::async_trait;

use crate::stack::ServiceDescriptor;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The runtime binary could not be started
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Command exited non-zero
    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("Unexpected runtime output: {0}")]
    Unexpected(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    /// Exists in any non-running state
    Stopped,
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Created,
    /// A stopped container with the same name was replaced
    Recreated,
    AlreadyRunning,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Created => write!(f, "created"),
            RunOutcome::Recreated => write!(f, "recreated"),
            RunOutcome::AlreadyRunning => write!(f, "already running"),
        }
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// A running container as reported by `list_running`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub name: String,
    pub image: String,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn network_exists(&self, network: &str) -> RuntimeResult<bool>;

    async fn create_network(&self, network: &str) -> RuntimeResult<()>;

    async fn container_status(&self, name: &str) -> RuntimeResult<ContainerStatus>;

    /// Creates and starts a container from `descriptor`
    ///
    /// Non-detached descriptors run in the foreground; the call returns when
    /// the container exits and fails if it exited non-zero.
    async fn create(&self, descriptor: &ServiceDescriptor, network: &str) -> RuntimeResult<()>;

    async fn start(&self, name: &str) -> RuntimeResult<()>;

    async fn stop(&self, name: &str) -> RuntimeResult<()>;

    async fn remove(&self, name: &str) -> RuntimeResult<()>;

    async fn list_running(&self) -> RuntimeResult<Vec<ContainerSummary>>;

    /// Runs `argv` inside a running container
    ///
    /// A non-zero exit is reported in the output, not as an error.
    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput>;

    /// Runs a throwaway `--rm` container on `network`; true when it exits 0
    async fn probe(&self, network: &str, image: &str, argv: &[String]) -> RuntimeResult<bool>;

    /// Brings `descriptor` up unless it is already running
    async fn run(&self, descriptor: &ServiceDescriptor, network: &str) -> RuntimeResult<RunOutcome> {
        match self.container_status(&descriptor.name).await? {
            ContainerStatus::Running => {
                tracing::info!(container = %descriptor.name, "Already running, skipping");
                Ok(RunOutcome::AlreadyRunning)
            }
            ContainerStatus::Stopped => {
                tracing::info!(container = %descriptor.name, "Removing stopped container");
                self.remove(&descriptor.name).await?;
                self.create(descriptor, network).await?;
                tracing::info!(container = %descriptor.name, image = %descriptor.image, "Container recreated");
                Ok(RunOutcome::Recreated)
            }
            ContainerStatus::Missing => {
                self.create(descriptor, network).await?;
                tracing::info!(container = %descriptor.name, image = %descriptor.image, "Container created");
                Ok(RunOutcome::Created)
            }
        }
    }

    /// Creates `network` if missing; true when it was created
    async fn ensure_network(&self, network: &str) -> RuntimeResult<bool> {
        if self.network_exists(network).await? {
            tracing::debug!(network, "Network exists");
            return Ok(false);
        }
        self.create_network(network).await?;
        tracing::info!(network, "Network created");
        Ok(true)
    }
}
