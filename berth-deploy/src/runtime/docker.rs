/// Docker CLI runtime
///
/// Shells out to the docker binary (`DOCKER_BIN`, default `docker`). Argument
/// lists are built by pure functions so they can be checked without docker.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::{
    ContainerRuntime, ContainerStatus, ContainerSummary, ExecOutput, RuntimeError, RuntimeResult,
};
use crate::stack::ServiceDescriptor;

pub struct DockerCli {
    program: String,
}

impl DockerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Uses `DOCKER_BIN` when set
    pub fn from_env() -> Self {
        let program = std::env::var("DOCKER_BIN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "docker".to_string());
        Self::new(program)
    }

    async fn output(&self, args: &[String]) -> RuntimeResult<ExecOutput> {
        tracing::debug!(command = %self.describe(args), "Running");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        Ok(ExecOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Like `output`, but a non-zero exit is an error
    async fn checked(&self, args: &[String]) -> RuntimeResult<ExecOutput> {
        let output = self.output(args).await?;
        if !output.success() {
            return Err(RuntimeError::CommandFailed {
                command: self.describe(args),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn describe(&self, args: &[String]) -> String {
        format!("{} {}", self.program, args.join(" "))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new("docker")
    }
}

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Argument list for `docker run` of `descriptor` on `network`
pub fn run_args(descriptor: &ServiceDescriptor, network: &str) -> Vec<String> {
    let mut argv = vec!["run".to_string()];
    if descriptor.detach {
        argv.push("-d".to_string());
    }
    argv.extend(["--name".to_string(), descriptor.name.clone()]);
    argv.extend(["--network".to_string(), network.to_string()]);

    for (container_port, host) in &descriptor.ports {
        argv.push("-p".to_string());
        argv.push(format!("{}:{}", host, container_port));
    }
    for (key, value) in &descriptor.environment {
        argv.push("-e".to_string());
        argv.push(format!("{}={}", key, value));
    }
    for volume in &descriptor.volumes {
        argv.push("-v".to_string());
        argv.push(volume.to_string());
    }
    for (host, target) in &descriptor.extra_hosts {
        argv.push("--add-host".to_string());
        argv.push(format!("{}:{}", host, target));
    }
    if let Some(restart) = &descriptor.restart {
        argv.extend(["--restart".to_string(), restart.clone()]);
    }

    argv.push(descriptor.image.clone());
    argv.extend(descriptor.command.iter().cloned());
    argv
}

/// Argument list for an ephemeral probe container
pub fn probe_args(network: &str, image: &str, command: &[String]) -> Vec<String> {
    let mut argv = args(["run", "--rm", "--network", network, image]);
    argv.extend(command.iter().cloned());
    argv
}

fn parse_status(raw: &str) -> ContainerStatus {
    match raw.trim() {
        "running" => ContainerStatus::Running,
        _ => ContainerStatus::Stopped,
    }
}

fn parse_running(raw: &str) -> Vec<ContainerSummary> {
    raw.lines()
        .filter_map(|line| {
            let (name, image) = line.split_once('\t')?;
            Some(ContainerSummary {
                name: name.trim().to_string(),
                image: image.trim().to_string(),
            })
        })
        .collect()
}

fn is_missing(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such") || stderr.contains("not found")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn network_exists(&self, network: &str) -> RuntimeResult<bool> {
        let output = self.output(&args(["network", "inspect", network])).await?;
        Ok(output.success())
    }

    async fn create_network(&self, network: &str) -> RuntimeResult<()> {
        self.checked(&args(["network", "create", network])).await?;
        Ok(())
    }

    async fn container_status(&self, name: &str) -> RuntimeResult<ContainerStatus> {
        let argv = args(["container", "inspect", "-f", "{{.State.Status}}", name]);
        let output = self.output(&argv).await?;
        if output.success() {
            return Ok(parse_status(&output.stdout));
        }
        if is_missing(&output.stderr) {
            return Ok(ContainerStatus::Missing);
        }
        Err(RuntimeError::CommandFailed {
            command: self.describe(&argv),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn create(&self, descriptor: &ServiceDescriptor, network: &str) -> RuntimeResult<()> {
        let output = self.checked(&run_args(descriptor, network)).await?;
        if !descriptor.detach && !output.stdout.trim().is_empty() {
            tracing::debug!(container = %descriptor.name, stdout = %output.stdout.trim(), "Foreground container finished");
        }
        Ok(())
    }

    async fn start(&self, name: &str) -> RuntimeResult<()> {
        self.checked(&args(["start", name])).await?;
        Ok(())
    }

    async fn stop(&self, name: &str) -> RuntimeResult<()> {
        self.checked(&args(["stop", name])).await?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> RuntimeResult<()> {
        self.checked(&args(["rm", "-f", name])).await?;
        Ok(())
    }

    async fn list_running(&self) -> RuntimeResult<Vec<ContainerSummary>> {
        let output = self
            .checked(&args(["ps", "--format", "{{.Names}}\t{{.Image}}"]))
            .await?;
        Ok(parse_running(&output.stdout))
    }

    async fn exec(&self, container: &str, argv: &[String]) -> RuntimeResult<ExecOutput> {
        let mut full = args(["exec", container]);
        full.extend(argv.iter().cloned());
        self.output(&full).await
    }

    async fn probe(&self, network: &str, image: &str, argv: &[String]) -> RuntimeResult<bool> {
        let output = self.output(&probe_args(network, image, argv)).await?;
        Ok(output.success())
    }
}
