//! Command-line interface definitions.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// berth - bring up and manage the self-hosted service stack.
#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the stack file
    #[arg(short, long, global = true, default_value = "stack.toml")]
    pub config: PathBuf,

    /// Use JSON log format instead of plain text
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Override log level (debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the enabled groups in order
    Up(UpArgs),

    /// Print the ordered startup steps
    Plan(PlanArgs),

    /// List running containers
    Ps,

    /// Stop the containers of one or more groups
    Stop(StopArgs),

    /// Export the identity provider realm to the local realm directory
    ExportRealm,

    /// Run the web app build container in the foreground
    BuildApp,
}

/// Arguments for the `up` subcommand.
#[derive(Parser, Debug)]
pub struct UpArgs {
    /// Comma-separated groups to start instead of `services_to_run`
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,

    /// Print the plan without touching containers
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the `plan` subcommand.
#[derive(Parser, Debug)]
pub struct PlanArgs {
    /// Comma-separated groups to plan instead of `services_to_run`
    #[arg(long, value_delimiter = ',')]
    pub only: Vec<String>,
}

/// Arguments for the `stop` subcommand.
#[derive(Parser, Debug)]
pub struct StopArgs {
    /// Groups to stop
    #[arg(default_value = "nextcloud")]
    pub groups: Vec<String>,

    /// Also stop databases and caches
    #[arg(long)]
    pub dbs: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_up() {
        let cli = Cli::parse_from(["berth", "-c", "prod.toml", "up", "--only", "keycloak,users", "--dry-run"]);
        assert_eq!(cli.config, PathBuf::from("prod.toml"));
        match cli.command {
            Commands::Up(args) => {
                assert_eq!(args.only, vec!["keycloak", "users"]);
                assert!(args.dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_stop_defaults_to_nextcloud() {
        let cli = Cli::parse_from(["berth", "stop"]);
        match cli.command {
            Commands::Stop(args) => {
                assert_eq!(args.groups, vec!["nextcloud"]);
                assert!(!args.dbs);
                assert!(!args.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        let cli = Cli::parse_from(["berth", "stop", "synapse", "mongo", "--dbs", "-y", "--json-logs"]);
        assert!(cli.json_logs);
        match cli.command {
            Commands::Stop(args) => {
                assert_eq!(args.groups, vec!["synapse", "mongo"]);
                assert!(args.dbs && args.yes);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_kebab_case_subcommands() {
        assert!(matches!(
            Cli::parse_from(["berth", "export-realm"]).command,
            Commands::ExportRealm
        ));
        assert!(matches!(
            Cli::parse_from(["berth", "build-app"]).command,
            Commands::BuildApp
        ));
    }
}
