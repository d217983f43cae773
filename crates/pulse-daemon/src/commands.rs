//! Command implementations for the pulse daemon.
//!
//! Handles:
//! - run: Load config, open storage, run the scheduler until interrupted
//! - rule check: Validate a rule file and preview upcoming due times
//! - admin: Job, run and settings management against the job store

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tokio::signal;
use tracing::info;

use pulse_recurrence::compute_next_run;
use pulse_scheduler::{AdminApi, LogSink, SchedulerConfig, SchedulerService};
use pulse_store::{JobStore, RocksStore, RunQuery};
use pulse_types::{
    AppConfig, DistributionSettings, JobPayload, JobRun, JobStatus, RecurrenceRule, RunStatus,
    ScheduledJob,
};

use crate::cli::AdminCommands;
use crate::roster::FileRoster;

fn init_logging(log_level: &str) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    // Ignore the error if a global subscriber is already set (tests).
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn open_store(config_path: Option<&str>, db_path: Option<&str>) -> Result<Arc<dyn JobStore>> {
    let config = AppConfig::load(config_path).context("Failed to load configuration")?;
    let path = db_path.unwrap_or(&config.db_path);
    let store = RocksStore::open(Path::new(path))
        .with_context(|| format!("Failed to open job store at {path}"))?;
    Ok(Arc::new(store))
}

/// Run the scheduler in the foreground until Ctrl-C.
pub async fn run_daemon(
    config_path: Option<&str>,
    db_path_override: Option<&str>,
    roster_path: &str,
    poll_interval_override: Option<u64>,
    log_level_override: Option<&str>,
) -> Result<()> {
    let mut config = AppConfig::load(config_path).context("Failed to load configuration")?;
    if let Some(db_path) = db_path_override {
        config.db_path = db_path.to_string();
    }
    if let Some(poll_interval) = poll_interval_override {
        config.poll_interval_secs = poll_interval;
    }
    if let Some(log_level) = log_level_override {
        config.log_level = log_level.to_string();
    }
    init_logging(&config.log_level);

    let store: Arc<dyn JobStore> = Arc::new(
        RocksStore::open(Path::new(&config.db_path))
            .with_context(|| format!("Failed to open job store at {}", config.db_path))?,
    );
    let roster = Arc::new(
        FileRoster::load(Path::new(roster_path))
            .with_context(|| format!("Failed to load roster from {roster_path}"))?,
    );

    let scheduler_config = SchedulerConfig {
        poll_interval_secs: config.poll_interval_secs,
        run_timeout_secs: config.run_timeout_secs,
        ..Default::default()
    };
    let service = SchedulerService::new(store, roster, Arc::new(LogSink), scheduler_config);
    service.start()?;
    info!(db_path = %config.db_path, "Pulse daemon running, press Ctrl-C to stop");

    signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    service.stop().await?;
    Ok(())
}

/// Validate a rule file and print its next `count` due times.
pub fn check_rule(file: &str, count: usize) -> Result<()> {
    let raw = std::fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))?;
    let rule: RecurrenceRule =
        serde_json::from_str(&raw).with_context(|| format!("Invalid rule in {file}"))?;
    rule.validate()?;
    let tz = rule.parse_timezone()?;

    println!("Rule is valid.");
    let calendar = DistributionSettings::default().calendar();
    let mut from = Utc::now();
    for i in 1..=count {
        match compute_next_run(&rule, from, &calendar)? {
            Some(next) => {
                println!(
                    "{i:>3}. {} ({})",
                    next.format("%Y-%m-%d %H:%M:%S UTC"),
                    next.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z")
                );
                from = next;
            }
            None => {
                println!("No further occurrences.");
                break;
            }
        }
    }
    Ok(())
}

/// Job definition file for `admin create-job`.
#[derive(Debug, Deserialize)]
struct JobSpec {
    name: String,
    rule: RecurrenceRule,
    payload: JobPayload,
}

/// Handle admin subcommands.
pub fn handle_admin(
    config_path: Option<&str>,
    db_path: Option<String>,
    command: AdminCommands,
) -> Result<()> {
    let store = open_store(config_path, db_path.as_deref())?;
    let api = AdminApi::new(store);

    match command {
        AdminCommands::Jobs { status } => {
            let status = status.as_deref().map(parse_job_status).transpose()?;
            let jobs = api.list_jobs(status)?;
            if jobs.is_empty() {
                println!("No jobs.");
            }
            for job in jobs {
                print_job(&job);
            }
        }
        AdminCommands::CreateJob { file } => {
            let raw =
                std::fs::read_to_string(&file).with_context(|| format!("Failed to read {file}"))?;
            let spec: JobSpec = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid job definition in {file}"))?;
            let job = api.create_job(&spec.name, spec.rule, spec.payload, Utc::now())?;
            println!("Created job {} ({})", job.id, job.name);
            if let Some(next) = job.next_run_at {
                println!("First run: {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        AdminCommands::Pause { job_id } => {
            if api.pause_job(&job_id)? {
                println!("Paused job {job_id}");
            } else {
                println!("Job {job_id} is not active; nothing to pause.");
            }
        }
        AdminCommands::Resume { job_id } => {
            if api.resume_job(&job_id, Utc::now())? {
                let job = api.get_job(&job_id)?;
                match job.next_run_at {
                    Some(next) => println!(
                        "Resumed job {job_id}, next run {}",
                        next.format("%Y-%m-%d %H:%M:%S UTC")
                    ),
                    None => println!("Resumed job {job_id}; rule exhausted, job archived."),
                }
            } else {
                println!("Job {job_id} is not paused; nothing to resume.");
            }
        }
        AdminCommands::Runs { job, status, limit } => {
            let status = status.as_deref().map(parse_run_status).transpose()?;
            let runs = api.list_runs(&RunQuery {
                job_id: job,
                status,
                limit: Some(limit),
            })?;
            if runs.is_empty() {
                println!("No runs.");
            }
            for run in runs {
                print_run_line(&run);
            }
        }
        AdminCommands::ShowRun { run_id } => {
            let run = api.get_run_details(&run_id)?;
            print_run_line(&run);
            if let Some(message) = &run.error_message {
                println!("  error: {message}");
            }
            for entry in &run.execution_log {
                println!("  [{}] {}", entry.at.format("%H:%M:%S"), entry.message);
            }
        }
        AdminCommands::DeleteRun { run_id } => {
            if api.delete_scheduled_run(&run_id)? {
                println!("Deleted run {run_id}");
            } else {
                println!("Run {run_id} has already started (or does not exist); not deleted.");
            }
        }
        AdminCommands::Settings => {
            let settings = api.get_settings()?;
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        AdminCommands::SetSettings { file } => {
            let raw =
                std::fs::read_to_string(&file).with_context(|| format!("Failed to read {file}"))?;
            let settings: DistributionSettings = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid settings in {file}"))?;
            api.update_settings(&settings)?;
            println!("Settings updated.");
        }
    }
    Ok(())
}

fn parse_job_status(s: &str) -> Result<JobStatus> {
    match s {
        "active" => Ok(JobStatus::Active),
        "paused" => Ok(JobStatus::Paused),
        "archived" => Ok(JobStatus::Archived),
        other => bail!("Unknown job status: {other} (expected active, paused or archived)"),
    }
}

fn parse_run_status(s: &str) -> Result<RunStatus> {
    match s {
        "scheduled" => Ok(RunStatus::Scheduled),
        "in_progress" => Ok(RunStatus::InProgress),
        "completed" => Ok(RunStatus::Completed),
        "failed" => Ok(RunStatus::Failed),
        other => bail!(
            "Unknown run status: {other} (expected scheduled, in_progress, completed or failed)"
        ),
    }
}

fn print_job(job: &ScheduledJob) {
    let next = job
        .next_run_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("{}  {:?}  next={}  {}", job.id, job.status, next, job.name);
}

fn print_run_line(run: &JobRun) {
    println!(
        "{}  {:?}  scheduled_for={}  processed={}/{}  ok={}  err={}  retries={}  units={}",
        run.id,
        run.status,
        run.scheduled_for.format("%Y-%m-%d %H:%M UTC"),
        run.processed_count,
        run.target_count,
        run.success_count,
        run.error_count,
        run.retry_count,
        run.total_units_distributed,
    );
}
