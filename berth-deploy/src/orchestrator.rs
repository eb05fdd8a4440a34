/// Deployment orchestrator
///
/// Brings a stack up step by step.
///
/// # Flow
///
/// ```text
/// Deployer::up(stack)
///   ├─> validate descriptors
///   ├─> host overrides, local CA trust
///   ├─> build plan (fails before anything starts)
///   ├─> TLS material check (warnings only)
///   ├─> ensure network
///   └─> for each step: run | wait | pull models
/// ```
///
/// A failed run or wait aborts the deployment with the step in the error.
/// Model pulls are best effort.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use berth_deploy::{orchestrator::Deployer, runtime::DockerCli, stack::StackConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), berth_deploy::error::DeployError> {
/// let stack = StackConfig::load("stack.toml")?;
/// let deployer = Deployer::new(Arc::new(DockerCli::from_env()), CancellationToken::new());
/// let report = deployer.up(stack).await?;
/// println!("started {:?}", report.started);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{DeployError, DeployResult};
use crate::hosts;
use crate::plan::{build_plan, Plan, Step};
use crate::readiness::{wait_for, WaitPolicy};
use crate::runtime::{ContainerRuntime, RunOutcome};
use crate::stack::StackConfig;

/// A stack with overrides applied and its plan resolved
#[derive(Debug, Clone)]
pub struct Prepared {
    pub stack: StackConfig,
    pub plan: Plan,
    pub warnings: Vec<String>,
}

/// What `up` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    /// Containers created or recreated, in start order
    pub started: Vec<String>,
    pub already_running: Vec<String>,
    pub network_created: bool,
    pub warnings: Vec<String>,
}

/// Validates `stack`, applies host overrides and CA trust, and builds the plan
///
/// Touches nothing but the filesystem, so it backs dry runs as well.
///
/// # Errors
///
/// Returns an error if the stack is invalid or an enabled group needs an
/// undefined service.
pub fn prepare(mut stack: StackConfig) -> DeployResult<Prepared> {
    stack.validate()?;

    let changed = hosts::apply_extra_hosts(&mut stack);
    if !changed.is_empty() {
        tracing::info!(containers = ?changed, "Applied host overrides");
    }

    hosts::apply_ca_trust(&mut stack)?;

    let plan = build_plan(&stack)?;

    let mut warnings: Vec<String> = plan
        .unknown
        .iter()
        .map(|key| format!("Unknown group '{}' ignored", key))
        .collect();
    warnings.extend(check_tls_material(&stack));

    Ok(Prepared {
        stack,
        plan,
        warnings,
    })
}

/// Warnings for missing TLS material
///
/// Local stacks need `localhost.crt` and `localhost.key` in `keys_dir`; other
/// stacks need `keys_dir` to exist. Nothing is generated here.
pub fn check_tls_material(stack: &StackConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if stack.is_localhost() {
        for file in ["localhost.crt", "localhost.key"] {
            let path = stack.keys_dir.join(file);
            if !path.is_file() {
                warnings.push(format!("TLS material missing: {}", path.display()));
            }
        }
    } else if !stack.keys_dir.is_dir() {
        warnings.push(format!(
            "Key directory {} does not exist",
            stack.keys_dir.display()
        ));
    }

    for warning in &warnings {
        tracing::warn!("{}", warning);
    }
    warnings
}

pub struct Deployer {
    runtime: Arc<dyn ContainerRuntime>,
    cancel: CancellationToken,
}

impl Deployer {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, cancel: CancellationToken) -> Self {
        Self { runtime, cancel }
    }

    /// Brings `stack` up
    ///
    /// # Errors
    ///
    /// - anything [`prepare`] rejects
    /// - `StepFailed` when a container cannot be run
    /// - `ReadinessTimeout` when a wait runs out of time
    /// - `Cancelled` when the cancel token fires
    pub async fn up(&self, stack: StackConfig) -> DeployResult<DeployReport> {
        let prepared = prepare(stack)?;
        self.execute(&prepared).await
    }

    /// Runs an already prepared plan
    pub async fn execute(&self, prepared: &Prepared) -> DeployResult<DeployReport> {
        let Prepared {
            stack,
            plan,
            warnings,
        } = prepared;

        let mut report = DeployReport {
            warnings: warnings.clone(),
            ..Default::default()
        };

        report.network_created = self.runtime.ensure_network(&stack.network).await?;

        let policy = WaitPolicy::from(&stack.readiness);
        let total = plan.steps.len();

        for (index, step) in plan.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }
            tracing::info!(step = index + 1, total, group = step.group(), "{}", step);

            match step {
                Step::Run { service, .. } => {
                    let outcome = self
                        .runtime
                        .run(service, &stack.network)
                        .await
                        .map_err(|source| DeployError::StepFailed {
                            step: step.to_string(),
                            source,
                        })?;
                    match outcome {
                        RunOutcome::AlreadyRunning => {
                            report.already_running.push(service.name.clone())
                        }
                        RunOutcome::Created | RunOutcome::Recreated => {
                            report.started.push(service.name.clone())
                        }
                    }
                }
                Step::Wait { probe, .. } => {
                    wait_for(
                        self.runtime.as_ref(),
                        &stack.network,
                        probe,
                        policy,
                        &self.cancel,
                    )
                    .await
                    .map_err(|e| match e {
                        DeployError::Runtime(source) => DeployError::StepFailed {
                            step: step.to_string(),
                            source,
                        },
                        other => other,
                    })?;
                }
                Step::PullModels {
                    container, models, ..
                } => {
                    let failed = self.pull_models(container, models).await;
                    report.warnings.extend(failed);
                }
            }
        }

        tracing::info!(
            started = report.started.len(),
            already_running = report.already_running.len(),
            warnings = report.warnings.len(),
            "Stack is up"
        );
        Ok(report)
    }

    /// Pulls each model inside `container`; returns a warning per failure
    async fn pull_models(&self, container: &str, models: &[String]) -> Vec<String> {
        let mut warnings = Vec::new();

        for model in models {
            let argv = vec!["ollama".to_string(), "pull".to_string(), model.clone()];
            let warning = match self.runtime.exec(container, &argv).await {
                Ok(output) if output.success() => {
                    tracing::info!(container, model = %model, "Model pulled");
                    continue;
                }
                Ok(output) => format!(
                    "Pulling model {} failed with status {}: {}",
                    model,
                    output.status,
                    output.stderr.trim()
                ),
                Err(e) => format!("Pulling model {} failed: {}", model, e),
            };
            tracing::warn!(container, model = %model, "{}", warning);
            warnings.push(warning);
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosts::CA_FILE;
    use crate::runtime::{ContainerStatus, MockCall, MockRuntime, RuntimeError};
    use crate::stack::ServiceDescriptor;

    fn stack(groups: &[&str], services: &[(&str, &str)]) -> StackConfig {
        let mut stack = StackConfig::from_toml(
            r#"
            network = "testnet"
            readiness = { interval_ms = 1000, timeout_secs = 5 }

            [hostnames]
            KEYCLOAK_BASE_URL = "keycloak.localhost"
        "#,
        )
        .unwrap();
        stack.services_to_run = groups.iter().map(|g| g.to_string()).collect();
        for (key, name) in services {
            stack
                .services
                .insert(key.to_string(), ServiceDescriptor::new(*name, "img"));
        }
        stack
    }

    fn keycloak_stack() -> StackConfig {
        stack(
            &["keycloak"],
            &[("keycloakdb", "keycloakdb"), ("keycloak", "keycloak")],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_up_issues_calls_in_order() {
        let runtime = Arc::new(MockRuntime::new().with_probe_results([false, true]));
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let report = deployer.up(keycloak_stack()).await.unwrap();
        assert!(report.network_created);
        assert_eq!(report.started, vec!["keycloakdb", "keycloak"]);

        let calls = runtime.calls();
        assert_eq!(calls[0], MockCall::CreateNetwork("testnet".to_string()));
        assert_eq!(
            calls[1],
            MockCall::Create {
                name: "keycloakdb".to_string(),
                network: "testnet".to_string()
            }
        );
        assert!(matches!(calls[2], MockCall::Probe { .. }));
        assert!(matches!(calls[3], MockCall::Probe { .. }));
        assert_eq!(
            calls[4],
            MockCall::Create {
                name: "keycloak".to_string(),
                network: "testnet".to_string()
            }
        );
        assert_eq!(calls.len(), 5);
    }

    #[tokio::test]
    async fn test_running_containers_are_reported_not_recreated() {
        let runtime = Arc::new(
            MockRuntime::new()
                .with_network("testnet")
                .with_container("keycloakdb", ContainerStatus::Running),
        );
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let report = deployer.up(keycloak_stack()).await.unwrap();
        assert!(!report.network_created);
        assert_eq!(report.already_running, vec!["keycloakdb"]);
        assert_eq!(runtime.created(), vec!["keycloak"]);
    }

    #[tokio::test]
    async fn test_run_failure_names_the_step() {
        let runtime = Arc::new(MockRuntime::new().failing("keycloakdb"));
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let err = deployer.up(keycloak_stack()).await.unwrap_err();
        match err {
            DeployError::StepFailed { step, source } => {
                assert_eq!(step, "run keycloakdb (img)");
                assert!(matches!(source, RuntimeError::CommandFailed { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(runtime.created(), vec!["keycloakdb"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_readiness_timeout_aborts() {
        let runtime =
            Arc::new(MockRuntime::new().with_probe_results(std::iter::repeat(false).take(50)));
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let err = deployer.up(keycloak_stack()).await.unwrap_err();
        assert!(matches!(err, DeployError::ReadinessTimeout { .. }));
        assert_eq!(runtime.created(), vec!["keycloakdb"]);
    }

    #[tokio::test]
    async fn test_missing_service_starts_nothing() {
        let runtime = Arc::new(MockRuntime::new());
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let err = deployer
            .up(stack(&["keycloak"], &[("keycloakdb", "keycloakdb")]))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::MissingService { .. }));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_step() {
        let runtime = Arc::new(MockRuntime::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deployer = Deployer::new(runtime.clone(), cancel);

        let err = deployer.up(keycloak_stack()).await.unwrap_err();
        assert!(matches!(err, DeployError::Cancelled));
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn test_model_pull_failures_are_warnings() {
        let mut stack = stack(&["ollama"], &[("ollama", "ollama")]);
        stack.models_to_pull = vec!["llama3".to_string(), "mistral".to_string()];

        let runtime = Arc::new(MockRuntime::new().with_exec_status(1));
        let deployer = Deployer::new(runtime.clone(), CancellationToken::new());

        let report = deployer.up(stack).await.unwrap();
        assert_eq!(report.started, vec!["ollama"]);
        let pulls: Vec<_> = report
            .warnings
            .iter()
            .filter(|w| w.starts_with("Pulling model"))
            .collect();
        assert_eq!(pulls.len(), 2);

        let execs = runtime
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Exec { .. }))
            .count();
        assert_eq!(execs, 2);
    }

    #[test]
    fn test_prepare_applies_overrides_and_warns() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = keycloak_stack();
        stack.keys_dir = dir.path().to_path_buf();
        stack.services_to_run.push("nonsense".to_string());
        std::fs::write(dir.path().join(CA_FILE), "ca").unwrap();
        std::fs::write(dir.path().join("localhost.crt"), "crt").unwrap();

        let prepared = prepare(stack).unwrap();
        let kc = prepared.stack.service("keycloak").unwrap();
        assert_eq!(kc.extra_hosts["keycloak.localhost"], "host-gateway");
        assert!(kc.environment.contains_key("REQUESTS_CA_BUNDLE"));

        match &prepared.plan.steps[2] {
            Step::Run { service, .. } => {
                assert_eq!(service.volumes.len(), 1);
                assert!(std::path::Path::new(&service.volumes[0].source).is_absolute());
            }
            other => panic!("unexpected step: {other}"),
        }

        assert_eq!(prepared.warnings.len(), 2);
        assert!(prepared.warnings[0].contains("nonsense"));
        assert!(prepared.warnings[1].contains("localhost.key"));
    }

    #[test]
    fn test_remote_stack_needs_key_dir() {
        let mut stack = keycloak_stack();
        stack.user_website = "example.org".to_string();
        stack.keys_dir = "/nonexistent/berth-keys".into();
        let warnings = check_tls_material(&stack);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("does not exist"));
    }
}
