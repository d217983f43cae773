//! Pulse daemon library exports.
//!
//! This crate provides the CLI binary for the Pulse distribution
//! scheduler.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (run, rule check, admin)
//! - `roster`: File-backed `DistributionBackend` for running outside the
//!   portal

pub mod cli;
pub mod commands;
pub mod roster;

pub use cli::{AdminCommands, Cli, Commands, RuleCommands};
pub use commands::{check_rule, handle_admin, run_daemon};
pub use roster::FileRoster;
