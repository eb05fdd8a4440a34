/// Host name overrides and CA trust
///
/// Public host names resolve to the docker host from inside containers, so
/// every descriptor gets an `--add-host` entry for each of them.

use std::collections::BTreeSet;

use crate::error::{DeployError, DeployResult};
use crate::stack::{StackConfig, VolumeMount};

/// Where the local identity provider CA is mounted in every container
pub const CA_MOUNT_PATH: &str = "/etc/ssl/certs/keycloak-ca.pem";

/// File name of the local identity provider CA inside `keys_dir`
pub const CA_FILE: &str = "keycloak-ca.pem";

const CA_ENV_VARS: [&str; 3] = ["REQUESTS_CA_BUNDLE", "SSL_CERT_FILE", "CURL_CA_BUNDLE"];

/// Public host names, deduplicated and sorted
///
/// Values of `hostnames` that are full URLs are skipped.
pub fn collect_public_hostnames(stack: &StackConfig) -> Vec<String> {
    let mut names: BTreeSet<String> = stack
        .hostnames
        .values()
        .filter(|v| !v.contains("://"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();

    for extra in [&stack.user_website, &stack.backend_location, &stack.gateway_alias] {
        let extra = extra.trim();
        if !extra.is_empty() {
            names.insert(extra.to_string());
        }
    }

    names.into_iter().collect()
}

/// Adds missing public host names to every descriptor's `extra_hosts`
///
/// Existing entries are kept as they are. Returns the names of the
/// containers that changed.
pub fn apply_extra_hosts(stack: &mut StackConfig) -> Vec<String> {
    let hostnames = collect_public_hostnames(stack);
    let target = stack.extra_host_target.clone();
    let mut changed = Vec::new();

    for service in stack.services.values_mut() {
        let mut added = 0;
        for host in &hostnames {
            if !service.extra_hosts.contains_key(host) {
                service.extra_hosts.insert(host.clone(), target.clone());
                added += 1;
            }
        }
        if added > 0 {
            tracing::debug!(container = %service.name, added, "Added host overrides");
            changed.push(service.name.clone());
        }
    }

    changed
}

/// Mounts the local CA into every container and points TLS clients at it
///
/// Applies only to `localhost` stacks with `keys_dir/keycloak-ca.pem` on disk.
/// The mount source is the canonical path of that file, since docker reads a
/// relative source as a named volume. Returns whether anything was applied.
///
/// # Errors
///
/// Returns `Io` if the CA file exists but cannot be resolved.
pub fn apply_ca_trust(stack: &mut StackConfig) -> DeployResult<bool> {
    let path = stack.keys_dir.join(CA_FILE);
    if !stack.is_localhost() || !path.is_file() {
        return Ok(false);
    }

    let ca_file = std::fs::canonicalize(&path).map_err(|source| DeployError::Io {
        path: path.clone(),
        source,
    })?;
    let ca_file = ca_file.to_string_lossy().into_owned();

    for service in stack.services.values_mut() {
        if !service.volumes.iter().any(|v| v.target == CA_MOUNT_PATH) {
            service
                .volumes
                .push(VolumeMount::read_only(ca_file.clone(), CA_MOUNT_PATH));
        }
        for var in CA_ENV_VARS {
            service
                .environment
                .entry(var.to_string())
                .or_insert_with(|| CA_MOUNT_PATH.to_string());
        }
    }

    tracing::info!(ca = %ca_file, "Local CA trusted in all containers");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::ServiceDescriptor;

    fn stack() -> StackConfig {
        let mut stack = StackConfig::from_toml(
            r#"
            backend_location = "api.localhost"

            [hostnames]
            KEYCLOAK_BASE_URL = "keycloak.localhost"
            MATRIX_BASE_URL = "matrix.localhost"
            WEBAPP_URL = "https://localhost"
            DUPLICATE = "api.localhost"
        "#,
        )
        .unwrap();
        stack
            .services
            .insert("a".to_string(), ServiceDescriptor::new("a", "img"));
        let mut b = ServiceDescriptor::new("b", "img");
        b.extra_hosts
            .insert("keycloak.localhost".to_string(), "10.0.0.1".to_string());
        stack.services.insert("b".to_string(), b);
        stack
    }

    #[test]
    fn test_collect_hostnames() {
        assert_eq!(
            collect_public_hostnames(&stack()),
            vec![
                "api.localhost",
                "host.docker.internal",
                "keycloak.localhost",
                "localhost",
                "matrix.localhost",
            ]
        );
    }

    #[test]
    fn test_extra_hosts_keep_existing_entries() {
        let mut stack = stack();
        let changed = apply_extra_hosts(&mut stack);
        assert_eq!(changed, vec!["a", "b"]);

        let b = stack.service("b").unwrap();
        assert_eq!(b.extra_hosts["keycloak.localhost"], "10.0.0.1");
        assert_eq!(b.extra_hosts["matrix.localhost"], "host-gateway");
        assert_eq!(b.extra_hosts.len(), 5);

        assert!(apply_extra_hosts(&mut stack).is_empty());
    }

    /// Keys directory under the crate root, addressed by a relative path
    fn relative_keys_dir(with_ca: bool) -> (tempfile::TempDir, std::path::PathBuf) {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let dir = tempfile::tempdir_in(root).unwrap();
        if with_ca {
            std::fs::write(dir.path().join(CA_FILE), "ca").unwrap();
        }
        let relative = dir.path().strip_prefix(root).unwrap().to_path_buf();
        (dir, relative)
    }

    #[test]
    fn test_ca_trust_only_for_localhost_with_ca() {
        let (_missing, missing_dir) = relative_keys_dir(false);
        let mut stack = stack();
        stack.keys_dir = missing_dir;
        assert!(!apply_ca_trust(&mut stack).unwrap());

        let (_dir, keys_dir) = relative_keys_dir(true);
        stack.keys_dir = keys_dir;
        stack.user_website = "example.org".to_string();
        assert!(!apply_ca_trust(&mut stack).unwrap());
        assert!(stack.service("a").unwrap().volumes.is_empty());
    }

    #[test]
    fn test_ca_trust_is_set_if_absent() {
        let (dir, keys_dir) = relative_keys_dir(true);
        let mut stack = stack();
        stack.keys_dir = keys_dir;
        stack
            .services
            .get_mut("a")
            .unwrap()
            .environment
            .insert("SSL_CERT_FILE".to_string(), "/custom.pem".to_string());

        assert!(apply_ca_trust(&mut stack).unwrap());
        assert!(apply_ca_trust(&mut stack).unwrap());

        let a = stack.service("a").unwrap();
        assert_eq!(a.volumes.len(), 1);
        assert_eq!(a.volumes[0].target, CA_MOUNT_PATH);
        assert_eq!(a.volumes[0].mode.as_deref(), Some("ro"));
        assert_eq!(a.environment["SSL_CERT_FILE"], "/custom.pem");
        assert_eq!(a.environment["CURL_CA_BUNDLE"], CA_MOUNT_PATH);

        let source = std::path::Path::new(&a.volumes[0].source);
        assert!(source.is_absolute());
        assert_eq!(
            source,
            std::fs::canonicalize(dir.path().join(CA_FILE)).unwrap()
        );
    }

    #[test]
    fn test_ca_mount_is_an_absolute_bind() {
        let (_dir, keys_dir) = relative_keys_dir(true);
        let mut stack = stack();
        stack.keys_dir = keys_dir;
        apply_ca_trust(&mut stack).unwrap();

        let args = crate::runtime::docker::run_args(stack.service("a").unwrap(), "testnet");
        let mount = args
            .iter()
            .position(|a| a == "-v")
            .map(|i| args[i + 1].clone())
            .unwrap();
        assert!(mount.starts_with('/'));
        assert!(mount.ends_with(":/etc/ssl/certs/keycloak-ca.pem:ro"));
    }
}
