//! Pulse distribution scheduler daemon
//!
//! Runs recurring token distributions and notifications for the Pulse
//! portal.
//!
//! # Usage
//!
//! ```bash
//! pulse-daemon run --roster people.json [--db-path PATH]
//! pulse-daemon rule check rule.json -n 10
//! pulse-daemon admin jobs
//! pulse-daemon admin runs --status failed
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/pulse/config.toml)
//! 3. Environment variables (PULSE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use pulse_daemon::{check_rule, handle_admin, run_daemon, Cli, Commands, RuleCommands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            db_path,
            roster,
            poll_interval,
        } => {
            run_daemon(
                cli.config.as_deref(),
                db_path.as_deref(),
                &roster,
                poll_interval,
                cli.log_level.as_deref(),
            )
            .await?;
        }
        Commands::Rule {
            command: RuleCommands::Check { file, count },
        } => {
            check_rule(&file, count)?;
        }
        Commands::Admin { db_path, command } => {
            handle_admin(cli.config.as_deref(), db_path, command)?;
        }
    }

    Ok(())
}
