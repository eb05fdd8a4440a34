/// Stack configuration
///
/// A stack file is TOML: global settings plus one `[services.<key>]` table
/// per container. Group keys in `services_to_run` select which parts of the
/// startup plan run (see [`crate::plan`]).
///
/// # Example
///
/// ```toml
/// network = "berth"
/// user_website = "localhost"
/// keys_dir = "certs/keys"
/// services_to_run = ["keycloak", "users"]
///
/// [hostnames]
/// KEYCLOAK_BASE_URL = "keycloak.localhost"
///
/// [services.keycloakdb]
/// name = "keycloakdb"
/// image = "postgres:16"
/// stateful = true
/// environment = { POSTGRES_DB = "keycloak" }
/// volumes = ["keycloak_data:/var/lib/postgresql/data"]
/// ```
///
/// # Environment Overrides
///
/// | Variable | Field |
/// |---|---|
/// | `BERTH_USER_WEBSITE` | `user_website` |
/// | `BERTH_BACKEND_LOCATION` | `backend_location` |
/// | `BERTH_NETWORK` | `network` |
/// | `BERTH_SERVICES` | `services_to_run` (comma separated) |
/// | `BERTH_EXTRA_HOST_TARGET` | `extra_host_target` |
/// | `BERTH_GATEWAY_ALIAS` | `gateway_alias` |

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// One container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Container name, also its hostname on the stack network
    pub name: String,

    pub image: String,

    /// Container port spec (`"5432/tcp"`) to host port
    #[serde(default)]
    pub ports: BTreeMap<String, HostPort>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: Vec<VolumeMount>,

    /// Hostname to address, passed as `--add-host`
    #[serde(default)]
    pub extra_hosts: BTreeMap<String, String>,

    #[serde(default)]
    pub command: Vec<String>,

    #[serde(default)]
    pub restart: Option<String>,

    #[serde(default = "default_true")]
    pub detach: bool,

    /// Databases and caches; `berth stop` leaves these running unless `--dbs`
    #[serde(default)]
    pub stateful: bool,
}

fn default_true() -> bool {
    true
}

impl ServiceDescriptor {
    /// A detached container with nothing but a name and an image
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ports: BTreeMap::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            extra_hosts: BTreeMap::new(),
            command: Vec::new(),
            restart: None,
            detach: true,
            stateful: false,
        }
    }
}

/// Host side of a port mapping: a bare port or `ip:port`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostPort {
    Port(u16),
    Address(String),
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPort::Port(port) => write!(f, "{}", port),
            HostPort::Address(addr) => f.write_str(addr),
        }
    }
}

/// A bind mount or named volume
///
/// Written either as `"src:dst[:mode]"` or as a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VolumeSpec")]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub mode: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VolumeSpec {
    Short(String),
    Long {
        source: String,
        target: String,
        #[serde(default)]
        mode: Option<String>,
    },
}

impl TryFrom<VolumeSpec> for VolumeMount {
    type Error = String;

    fn try_from(spec: VolumeSpec) -> Result<Self, Self::Error> {
        match spec {
            VolumeSpec::Short(s) => s.parse(),
            VolumeSpec::Long {
                source,
                target,
                mode,
            } => Ok(VolumeMount {
                source,
                target,
                mode,
            }),
        }
    }
}

impl std::str::FromStr for VolumeMount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let (source, target, mode) = match parts.as_slice() {
            [source, target] => (*source, *target, None),
            [source, target, mode] => (*source, *target, Some(mode.to_string())),
            _ => return Err(format!("volume '{}' is not src:dst[:mode]", s)),
        };
        if source.is_empty() || target.is_empty() {
            return Err(format!("volume '{}' has an empty side", s));
        }
        Ok(VolumeMount {
            source: source.to_string(),
            target: target.to_string(),
            mode,
        })
    }
}

impl VolumeMount {
    pub fn read_only(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            mode: Some("ro".to_string()),
        }
    }
}

impl fmt::Display for VolumeMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if let Some(mode) = &self.mode {
            write!(f, ":{}", mode)?;
        }
        Ok(())
    }
}

/// Poll settings for readiness waits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessSettings {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// `[realm_export]`: one-off identity provider realm export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmExportConfig {
    /// Defaults to the image of the `keycloak` service
    pub image: Option<String>,
    pub container_name: String,
    pub realm: String,
    /// Directory inside the container
    pub export_dir: String,
    /// Host directory mounted at `export_dir`
    pub local_dir: PathBuf,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,
    pub db_user: String,
    pub db_password: String,
}

impl Default for RealmExportConfig {
    fn default() -> Self {
        Self {
            image: None,
            container_name: "keycloak_export".to_string(),
            realm: "opentdf".to_string(),
            export_dir: "/opt/keycloak/data/export".to_string(),
            local_dir: PathBuf::from("keycloak/realms"),
            db_host: "keycloakdb".to_string(),
            db_port: 5432,
            db_name: "keycloak".to_string(),
            db_user: "postgres".to_string(),
            db_password: String::new(),
        }
    }
}

/// Whole stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default = "default_network")]
    pub network: String,

    /// Public site host; `localhost` selects local certificates and CA trust
    #[serde(default = "default_user_website")]
    pub user_website: String,

    #[serde(default)]
    pub backend_location: String,

    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,

    /// Group keys to start, see [`crate::plan`]
    #[serde(default)]
    pub services_to_run: Vec<String>,

    /// `*_BASE_URL` style public host names
    #[serde(default)]
    pub hostnames: BTreeMap<String, String>,

    #[serde(default = "default_gateway_alias")]
    pub gateway_alias: String,

    #[serde(default = "default_extra_host_target")]
    pub extra_host_target: String,

    #[serde(default)]
    pub models_to_pull: Vec<String>,

    #[serde(default)]
    pub readiness: ReadinessSettings,

    #[serde(default)]
    pub realm_export: RealmExportConfig,

    #[serde(default)]
    pub services: BTreeMap<String, ServiceDescriptor>,
}

fn default_network() -> String {
    "berth".to_string()
}

fn default_user_website() -> String {
    "localhost".to_string()
}

fn default_keys_dir() -> PathBuf {
    PathBuf::from("certs/keys")
}

fn default_gateway_alias() -> String {
    "host.docker.internal".to_string()
}

fn default_extra_host_target() -> String {
    "host-gateway".to_string()
}

impl StackConfig {
    /// Reads a stack file and applies `BERTH_*` overrides from the environment
    ///
    /// A `.env` file in the working directory is loaded first when present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid stack.
    pub fn load(path: impl AsRef<Path>) -> DeployResult<Self> {
        let path = path.as_ref();
        dotenvy::dotenv().ok();

        let raw = std::fs::read_to_string(path).map_err(|source| DeployError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut stack = Self::from_toml(&raw).map_err(|message| DeployError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        stack.apply_env_overrides(|key| std::env::var(key).ok());

        tracing::debug!(
            path = %path.display(),
            services = stack.services.len(),
            groups = ?stack.services_to_run,
            "Loaded stack"
        );
        Ok(stack)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Applies `BERTH_*` overrides from any variable source
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("BERTH_USER_WEBSITE") {
            self.user_website = v;
        }
        if let Some(v) = var("BERTH_BACKEND_LOCATION") {
            self.backend_location = v;
        }
        if let Some(v) = var("BERTH_NETWORK") {
            self.network = v;
        }
        if let Some(v) = var("BERTH_SERVICES") {
            self.services_to_run = split_list(&v);
        }
        if let Some(v) = var("BERTH_EXTRA_HOST_TARGET") {
            self.extra_host_target = v;
        }
        if let Some(v) = var("BERTH_GATEWAY_ALIAS") {
            self.gateway_alias = v;
        }
    }

    /// Checks every descriptor has a name and image and names are unique
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Invalid` describing the first problem found.
    pub fn validate(&self) -> DeployResult<()> {
        if self.network.trim().is_empty() {
            return Err(DeployError::Invalid("network must not be empty".to_string()));
        }

        let mut names = HashSet::new();
        for (key, service) in &self.services {
            if service.name.trim().is_empty() {
                return Err(DeployError::Invalid(format!("services.{} has no name", key)));
            }
            if service.image.trim().is_empty() {
                return Err(DeployError::Invalid(format!("services.{} has no image", key)));
            }
            if !names.insert(service.name.as_str()) {
                return Err(DeployError::Invalid(format!(
                    "container name '{}' is used more than once",
                    service.name
                )));
            }
        }
        Ok(())
    }

    /// Whether `group` is listed in `services_to_run`
    pub fn enabled(&self, group: &str) -> bool {
        self.services_to_run.iter().any(|g| g == group)
    }

    pub fn service(&self, key: &str) -> Option<&ServiceDescriptor> {
        self.services.get(key)
    }

    pub fn is_localhost(&self) -> bool {
        self.user_website == "localhost"
    }
}

/// Splits a comma separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
