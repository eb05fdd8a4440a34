/// Readiness waits
///
/// Each probe runs as a throwaway container on the stack network, so host
/// names resolve exactly as they do for the services themselves. A wait polls
/// until the probe exits 0, the deadline passes, or the run is cancelled.

use std::fmt;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, DeployResult};
use crate::runtime::ContainerRuntime;
use crate::stack::ReadinessSettings;

const POSTGRES_IMAGE: &str = "postgres:16-alpine";
const TCP_IMAGE: &str = "busybox:1.36";
const MONGO_IMAGE: &str = "mongo:7";
const HTTP_IMAGE: &str = "curlimages/curl:8.8.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    Postgres { host: String, port: u16 },
    Tcp { host: String, port: u16 },
    Mongo { host: String, port: u16 },
    Http { url: String },
}

impl ReadinessProbe {
    pub fn image(&self) -> &'static str {
        match self {
            ReadinessProbe::Postgres { .. } => POSTGRES_IMAGE,
            ReadinessProbe::Tcp { .. } => TCP_IMAGE,
            ReadinessProbe::Mongo { .. } => MONGO_IMAGE,
            ReadinessProbe::Http { .. } => HTTP_IMAGE,
        }
    }

    pub fn command(&self) -> Vec<String> {
        match self {
            ReadinessProbe::Postgres { host, port } => vec![
                "pg_isready".into(),
                "-h".into(),
                host.clone(),
                "-p".into(),
                port.to_string(),
            ],
            ReadinessProbe::Tcp { host, port } => {
                vec!["nc".into(), "-z".into(), host.clone(), port.to_string()]
            }
            ReadinessProbe::Mongo { host, port } => vec![
                "mongosh".into(),
                "--quiet".into(),
                format!("mongodb://{}:{}", host, port),
                "--eval".into(),
                "db.adminCommand('ping')".into(),
            ],
            ReadinessProbe::Http { url } => {
                vec!["-fsS".into(), "-o".into(), "/dev/null".into(), url.clone()]
            }
        }
    }
}

impl fmt::Display for ReadinessProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessProbe::Postgres { host, port } => write!(f, "postgres {}:{}", host, port),
            ReadinessProbe::Tcp { host, port } => write!(f, "tcp {}:{}", host, port),
            ReadinessProbe::Mongo { host, port } => write!(f, "mongo {}:{}", host, port),
            ReadinessProbe::Http { url } => write!(f, "http {}", url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl From<&ReadinessSettings> for WaitPolicy {
    fn from(settings: &ReadinessSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms.max(1)),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

/// Polls `probe` until it succeeds
///
/// Returns the number of attempts it took.
///
/// # Errors
///
/// - `ReadinessTimeout` once `policy.timeout` has passed without success
/// - `Cancelled` when `cancel` fires
/// - `Runtime` if the probe container cannot be run at all
pub async fn wait_for(
    runtime: &dyn ContainerRuntime,
    network: &str,
    probe: &ReadinessProbe,
    policy: WaitPolicy,
    cancel: &CancellationToken,
) -> DeployResult<u32> {
    let started = Instant::now();
    let command = probe.command();
    let mut attempts = 0;

    tracing::info!(probe = %probe, timeout_secs = policy.timeout.as_secs(), "Waiting for readiness");

    loop {
        attempts += 1;
        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            ready = runtime.probe(network, probe.image(), &command) => ready?,
        };

        if ready {
            tracing::info!(probe = %probe, attempts, "Ready");
            return Ok(attempts);
        }

        let waited = started.elapsed();
        if waited >= policy.timeout {
            return Err(DeployError::ReadinessTimeout {
                probe: probe.to_string(),
                waited_secs: waited.as_secs(),
            });
        }

        tracing::debug!(probe = %probe, attempts, "Not ready yet");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeployError::Cancelled),
            _ = sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockCall, MockRuntime};

    fn policy(timeout_secs: u64) -> WaitPolicy {
        WaitPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn postgres() -> ReadinessProbe {
        ReadinessProbe::Postgres {
            host: "keycloakdb".to_string(),
            port: 5432,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_ready() {
        let runtime = MockRuntime::new().with_probe_results([false, false, false]);
        let attempts = wait_for(&runtime, "berth", &postgres(), policy(10), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(attempts, 4);

        let calls = runtime.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(
            calls[0],
            MockCall::Probe {
                image: POSTGRES_IMAGE.to_string(),
                argv: postgres().command(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let runtime = MockRuntime::new().with_probe_results(std::iter::repeat(false).take(100));
        let err = wait_for(&runtime, "berth", &postgres(), policy(5), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            DeployError::ReadinessTimeout { probe, waited_secs } => {
                assert_eq!(probe, "postgres keycloakdb:5432");
                assert_eq!(waited_secs, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_wait() {
        let runtime = MockRuntime::new().with_probe_results(std::iter::repeat(false).take(100));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let err = wait_for(&runtime, "berth", &postgres(), policy(60), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
        assert!(runtime.calls().len() <= 4);
    }

    #[test]
    fn test_probe_commands() {
        let tcp = ReadinessProbe::Tcp {
            host: "nextcloud-app".to_string(),
            port: 80,
        };
        assert_eq!(tcp.command(), vec!["nc", "-z", "nextcloud-app", "80"]);
        assert_eq!(tcp.image(), TCP_IMAGE);

        let mongo = ReadinessProbe::Mongo {
            host: "mongo_db".to_string(),
            port: 27017,
        };
        assert!(mongo.command().contains(&"mongodb://mongo_db:27017".to_string()));

        let http = ReadinessProbe::Http {
            url: "http://keycloak:8080/health".to_string(),
        };
        assert_eq!(http.command().last().unwrap(), "http://keycloak:8080/health");
        assert_eq!(http.to_string(), "http http://keycloak:8080/health");
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = WaitPolicy::from(&ReadinessSettings {
            interval_ms: 0,
            timeout_secs: 30,
        });
        assert_eq!(policy.interval, Duration::from_millis(1));
        assert_eq!(policy.timeout, Duration::from_secs(30));
    }
}
