/// One-off operations: stopping groups, realm export, app build

use std::path::PathBuf;

use crate::error::{DeployError, DeployResult};
use crate::plan::{group, GROUPS};
use crate::runtime::{ContainerRuntime, ContainerStatus, RunOutcome};
use crate::stack::{ServiceDescriptor, StackConfig, VolumeMount};

/// Container names to stop for `groups`, in reverse start order
///
/// Stateful containers are left out unless `include_stateful`. Service keys
/// a group names but the stack does not define are skipped.
///
/// # Errors
///
/// Returns `UnknownGroup` for a key that names no group.
pub fn stop_targets(
    stack: &StackConfig,
    groups: &[String],
    include_stateful: bool,
) -> DeployResult<Vec<String>> {
    for key in groups {
        if group(key).is_none() {
            return Err(DeployError::UnknownGroup(key.clone()));
        }
    }

    let mut targets: Vec<String> = GROUPS
        .iter()
        .filter(|g| groups.iter().any(|key| key == g.key))
        .flat_map(|g| g.services())
        .filter_map(|key| stack.service(key))
        .filter(|service| include_stateful || !service.stateful)
        .map(|service| service.name.clone())
        .collect();

    targets.reverse();
    Ok(targets)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
    pub stopped: Vec<String>,
    /// Not running, nothing to do
    pub skipped: Vec<String>,
    /// Container name and error
    pub failed: Vec<(String, String)>,
}

/// Stops each running target, carrying on past failures
pub async fn stop(runtime: &dyn ContainerRuntime, targets: &[String]) -> StopReport {
    let mut report = StopReport::default();

    for name in targets {
        match runtime.container_status(name).await {
            Ok(ContainerStatus::Running) => {}
            Ok(_) => {
                tracing::info!(container = %name, "Not running");
                report.skipped.push(name.clone());
                continue;
            }
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "Could not inspect container");
                report.failed.push((name.clone(), e.to_string()));
                continue;
            }
        }

        match runtime.stop(name).await {
            Ok(()) => {
                tracing::info!(container = %name, "Stopped");
                report.stopped.push(name.clone());
            }
            Err(e) => {
                tracing::warn!(container = %name, error = %e, "Failed to stop container");
                report.failed.push((name.clone(), e.to_string()));
            }
        }
    }

    report
}

/// Descriptor for the one-off realm export container
///
/// `local_dir` is the host directory mounted at the export directory.
pub fn realm_export_descriptor(
    stack: &StackConfig,
    local_dir: &str,
) -> DeployResult<ServiceDescriptor> {
    let export = &stack.realm_export;

    let image = match &export.image {
        Some(image) => image.clone(),
        None => stack
            .service("keycloak")
            .map(|kc| kc.image.clone())
            .ok_or_else(|| DeployError::MissingService {
                group: "export-realm".to_string(),
                service: "keycloak".to_string(),
            })?,
    };

    let mut descriptor = ServiceDescriptor::new(&export.container_name, image);
    descriptor.detach = false;

    let env = [
        ("KC_DB", "postgres".to_string()),
        ("KC_DB_URL_HOST", export.db_host.clone()),
        ("KC_DB_URL_PORT", export.db_port.to_string()),
        ("KC_DB_URL_DATABASE", export.db_name.clone()),
        ("KC_DB_USERNAME", export.db_user.clone()),
        ("KC_DB_PASSWORD", export.db_password.clone()),
    ];
    descriptor.environment = env
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

    descriptor.volumes.push(VolumeMount {
        source: local_dir.to_string(),
        target: export.export_dir.clone(),
        mode: Some("rw".to_string()),
    });
    descriptor.command = [
        "export",
        "--dir",
        export.export_dir.as_str(),
        "--realm",
        export.realm.as_str(),
        "--users",
        "different_files",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    Ok(descriptor)
}

/// Exports the configured realm into `realm_export.local_dir`
///
/// Runs in the foreground and returns the host directory written to.
///
/// # Errors
///
/// Fails if the directory cannot be created, no image is known, or the
/// export container fails.
pub async fn export_realm(
    runtime: &dyn ContainerRuntime,
    stack: &StackConfig,
) -> DeployResult<PathBuf> {
    let local_dir = &stack.realm_export.local_dir;
    std::fs::create_dir_all(local_dir).map_err(|source| DeployError::Io {
        path: local_dir.clone(),
        source,
    })?;
    // Bind mounts need an absolute path
    let local_dir = std::fs::canonicalize(local_dir).map_err(|source| DeployError::Io {
        path: local_dir.clone(),
        source,
    })?;

    let descriptor = realm_export_descriptor(stack, &local_dir.to_string_lossy())?;

    tracing::info!(
        realm = %stack.realm_export.realm,
        dir = %local_dir.display(),
        "Exporting realm"
    );

    runtime.ensure_network(&stack.network).await?;
    runtime
        .run(&descriptor, &stack.network)
        .await
        .map_err(|source| DeployError::StepFailed {
            step: format!("export realm {}", stack.realm_export.realm),
            source,
        })?;

    tracing::info!(dir = %local_dir.display(), "Realm exported");
    Ok(local_dir)
}

/// Runs the `webapp_build` container in the foreground
///
/// # Errors
///
/// `MissingService` when no `webapp_build` descriptor exists; `StepFailed`
/// carrying the container's stderr when the build fails.
pub async fn build_app(
    runtime: &dyn ContainerRuntime,
    stack: &StackConfig,
) -> DeployResult<RunOutcome> {
    let mut descriptor = stack
        .service("webapp_build")
        .cloned()
        .ok_or_else(|| DeployError::MissingService {
            group: "build-app".to_string(),
            service: "webapp_build".to_string(),
        })?;
    descriptor.detach = false;

    runtime.ensure_network(&stack.network).await?;
    let outcome = runtime
        .run(&descriptor, &stack.network)
        .await
        .map_err(|source| DeployError::StepFailed {
            step: format!("build {}", descriptor.name),
            source,
        })?;

    tracing::info!(container = %descriptor.name, "App build finished");
    Ok(outcome)
}
