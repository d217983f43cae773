//! CLI argument parsing for the pulse daemon.

use clap::{Parser, Subcommand};

/// Pulse distribution scheduler
///
/// Runs recurring token distributions and notifications for the Pulse
/// portal, and provides admin access to jobs, runs and settings.
#[derive(Parser, Debug)]
#[command(name = "pulse-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/pulse/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler in the foreground
    Run {
        /// Override database path
        #[arg(long)]
        db_path: Option<String>,

        /// JSON roster file resolving distribution recipients
        #[arg(long)]
        roster: String,

        /// Override poll interval in seconds
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Recurrence rule utilities
    Rule {
        #[command(subcommand)]
        command: RuleCommands,
    },

    /// Administrative commands against the job store
    Admin {
        /// Database path (default from config)
        #[arg(long)]
        db_path: Option<String>,

        #[command(subcommand)]
        command: AdminCommands,
    },
}

/// Rule subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RuleCommands {
    /// Validate a rule file and preview its upcoming due times
    Check {
        /// Path to a JSON recurrence rule
        file: String,

        /// Number of occurrences to preview
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },
}

/// Admin subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// List scheduled jobs
    Jobs {
        /// Filter by status (active, paused, archived)
        #[arg(long)]
        status: Option<String>,
    },

    /// Create a job from a JSON definition file
    CreateJob {
        /// Path to a JSON file with name, rule and payload
        file: String,
    },

    /// Pause an active job
    Pause {
        /// Job ID
        job_id: String,
    },

    /// Resume a paused job
    Resume {
        /// Job ID
        job_id: String,
    },

    /// List job runs
    Runs {
        /// Filter by job ID
        #[arg(long)]
        job: Option<String>,

        /// Filter by status (scheduled, in_progress, completed, failed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum results
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Show one run, including its execution log
    ShowRun {
        /// Run ID
        run_id: String,
    },

    /// Delete a run that has not started yet
    DeleteRun {
        /// Run ID
        run_id: String,
    },

    /// Show the distribution settings
    Settings,

    /// Replace the distribution settings from a JSON file
    SetSettings {
        /// Path to a JSON settings file
        file: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_run_with_roster() {
        let cli = Cli::parse_from(["pulse-daemon", "run", "--roster", "people.json"]);
        match cli.command {
            Commands::Run { roster, db_path, .. } => {
                assert_eq!(roster, "people.json");
                assert_eq!(db_path, None);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_with_db_path() {
        let cli = Cli::parse_from([
            "pulse-daemon",
            "run",
            "--roster",
            "people.json",
            "--db-path",
            "/custom/db",
        ]);
        match cli.command {
            Commands::Run { db_path, .. } => assert_eq!(db_path, Some("/custom/db".to_string())),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from([
            "pulse-daemon",
            "--config",
            "/path/to/config.toml",
            "admin",
            "jobs",
        ]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
    }

    #[test]
    fn test_cli_rule_check() {
        let cli = Cli::parse_from(["pulse-daemon", "rule", "check", "rule.json", "-n", "10"]);
        match cli.command {
            Commands::Rule {
                command: RuleCommands::Check { file, count },
            } => {
                assert_eq!(file, "rule.json");
                assert_eq!(count, 10);
            }
            _ => panic!("Expected Rule Check command"),
        }
    }

    #[test]
    fn test_cli_admin_pause() {
        let cli = Cli::parse_from(["pulse-daemon", "admin", "pause", "01JABC"]);
        match cli.command {
            Commands::Admin { command, .. } => match command {
                AdminCommands::Pause { job_id } => assert_eq!(job_id, "01JABC"),
                _ => panic!("Expected Pause command"),
            },
            _ => panic!("Expected Admin command"),
        }
    }

    #[test]
    fn test_cli_admin_runs_filters() {
        let cli = Cli::parse_from([
            "pulse-daemon",
            "admin",
            "runs",
            "--job",
            "01JABC",
            "--status",
            "failed",
            "--limit",
            "5",
        ]);
        match cli.command {
            Commands::Admin { command, .. } => match command {
                AdminCommands::Runs { job, status, limit } => {
                    assert_eq!(job, Some("01JABC".to_string()));
                    assert_eq!(status, Some("failed".to_string()));
                    assert_eq!(limit, 5);
                }
                _ => panic!("Expected Runs command"),
            },
            _ => panic!("Expected Admin command"),
        }
    }

    #[test]
    fn test_cli_with_log_level() {
        let cli = Cli::parse_from([
            "pulse-daemon",
            "--log-level",
            "debug",
            "admin",
            "settings",
        ]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }
}
