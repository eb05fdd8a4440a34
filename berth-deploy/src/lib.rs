//! # berth-deploy
//!
//! Brings up the self-hosted service stack: reads a TOML stack file, resolves
//! the enabled groups into an ordered plan, and drives a container runtime
//! through it, waiting on databases where later services depend on them.
//!
//! ## Modules
//!
//! - `stack`: stack file model and `BERTH_*` overrides
//! - `hosts`: host name overrides and local CA trust
//! - `plan`: the fixed startup table
//! - `readiness`: probe containers and polling
//! - `runtime`: the container runtime seam (docker CLI, mock)
//! - `orchestrator`: `berth up`
//! - `ops`: stop, realm export, app build
//! - `cli`: the `berth` command line

pub mod cli;
pub mod error;
pub mod hosts;
pub mod ops;
pub mod orchestrator;
pub mod plan;
pub mod readiness;
pub mod runtime;
pub mod stack;
