//! Subcommand handlers.

use std::sync::Arc;

use anyhow::Context;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tokio_util::sync::CancellationToken;

use super::{Cli, Commands, PlanArgs, StopArgs, UpArgs};
use crate::error::DeployError;
use crate::ops;
use crate::orchestrator::{prepare, Deployer, Prepared};
use crate::runtime::{ContainerRuntime, DockerCli, RuntimeError};
use crate::stack::StackConfig;

/// Runs the parsed command against the docker CLI
pub async fn execute(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::from_env());

    if let Commands::Ps = cli.command {
        return ps(runtime.as_ref()).await;
    }

    let stack = StackConfig::load(&cli.config)
        .with_context(|| format!("Could not load {}", cli.config.display()))?;

    match cli.command {
        Commands::Up(args) => up(runtime, stack, args, cancel).await,
        Commands::Plan(args) => plan(stack, args),
        Commands::Stop(args) => stop(runtime.as_ref(), &stack, args).await,
        Commands::ExportRealm => {
            let dir = ops::export_realm(runtime.as_ref(), &stack).await?;
            println!("Realm '{}' exported to {}", stack.realm_export.realm, dir.display());
            Ok(())
        }
        Commands::BuildApp => build_app(runtime.as_ref(), &stack).await,
        Commands::Ps => Ok(()),
    }
}

fn with_only(mut stack: StackConfig, only: Vec<String>) -> StackConfig {
    if !only.is_empty() {
        stack.services_to_run = only;
    }
    stack
}

fn print_plan(prepared: &Prepared) {
    if prepared.plan.is_empty() {
        println!("Nothing to start; services_to_run enables no groups.");
    }
    for (index, step) in prepared.plan.steps.iter().enumerate() {
        println!("{:>3}. [{}] {}", index + 1, step.group(), step);
    }
    for warning in &prepared.warnings {
        println!("warning: {}", warning);
    }
}

async fn up(
    runtime: Arc<dyn ContainerRuntime>,
    stack: StackConfig,
    args: UpArgs,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let prepared = prepare(with_only(stack, args.only))?;

    if args.dry_run {
        print_plan(&prepared);
        return Ok(());
    }

    let deployer = Deployer::new(runtime, cancel);
    let report = deployer.execute(&prepared).await?;

    if report.network_created {
        println!("Created network {}", prepared.stack.network);
    }
    for name in &report.started {
        println!("started  {}", name);
    }
    for name in &report.already_running {
        println!("running  {}", name);
    }
    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    Ok(())
}

fn plan(stack: StackConfig, args: PlanArgs) -> anyhow::Result<()> {
    let prepared = prepare(with_only(stack, args.only))?;
    print_plan(&prepared);
    Ok(())
}

async fn ps(runtime: &dyn ContainerRuntime) -> anyhow::Result<()> {
    let running = runtime.list_running().await?;
    if running.is_empty() {
        println!("No running containers.");
        return Ok(());
    }
    let width = running.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for container in running {
        println!("{:<width$}  {}", container.name, container.image, width = width);
    }
    Ok(())
}

async fn stop(
    runtime: &dyn ContainerRuntime,
    stack: &StackConfig,
    args: StopArgs,
) -> anyhow::Result<()> {
    let targets = ops::stop_targets(stack, &args.groups, args.dbs)?;
    if targets.is_empty() {
        println!("Nothing to stop for {}.", args.groups.join(", "));
        return Ok(());
    }

    println!("Running containers:");
    ps(runtime).await?;
    println!();
    println!("Will stop: {}", targets.join(", "));

    if !args.yes {
        let proceed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Stop these containers?")
            .default(false)
            .interact()?;
        if !proceed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = ops::stop(runtime, &targets).await;
    for (name, error) in &report.failed {
        eprintln!("Failed to stop {}: {}", name, error);
    }

    println!();
    println!("Running containers:");
    ps(runtime).await?;

    if !report.failed.is_empty() {
        anyhow::bail!("{} container(s) could not be stopped", report.failed.len());
    }
    Ok(())
}

async fn build_app(runtime: &dyn ContainerRuntime, stack: &StackConfig) -> anyhow::Result<()> {
    match ops::build_app(runtime, stack).await {
        Ok(_) => {
            println!("App build finished.");
            Ok(())
        }
        Err(DeployError::StepFailed {
            step,
            source: RuntimeError::CommandFailed { status, stderr, .. },
        }) => {
            eprintln!("{}", stderr);
            anyhow::bail!("{} failed with status {}", step, status)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_replaces_enabled_groups() {
        let mut stack = StackConfig::from_toml("").unwrap();
        stack.services_to_run = vec!["keycloak".to_string()];

        let kept = with_only(stack.clone(), Vec::new());
        assert_eq!(kept.services_to_run, vec!["keycloak"]);

        let replaced = with_only(stack, vec!["users".to_string()]);
        assert_eq!(replaced.services_to_run, vec!["users"]);
    }
}
