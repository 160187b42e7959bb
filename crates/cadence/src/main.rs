//! Cadence: in-process job scheduler
//!
//! Main binary with subcommands:
//! - `run`: Scheduler daemon over the persisted job file
//! - `jobs`: List persisted jobs
//! - `cron`: Check and preview a cron expression

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cadence_scheduler::{DEFAULT_PERSISTENCE_PATH, JobStatus, SchedulerConfig};

mod daemon;
mod inspect;

/// Parse a job status name for `--status`.
fn parse_status(s: &str) -> Result<JobStatus, String> {
    s.to_lowercase().parse::<JobStatus>().map_err(|_| {
        format!(
            "invalid status '{}', expected pending/running/completed/failed/cancelled",
            s
        )
    })
}

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "In-process recurring and one-off job scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler over persisted jobs until interrupted
    Run {
        /// Job persistence file
        #[arg(long, env = "CADENCE_PERSISTENCE_PATH", default_value = DEFAULT_PERSISTENCE_PATH)]
        persistence_path: PathBuf,

        /// Seconds between scheduler ticks
        #[arg(long, env = "CADENCE_CHECK_INTERVAL", default_value = "60")]
        check_interval: u64,

        /// Retries allowed for jobs that do not set their own
        #[arg(long, env = "CADENCE_MAX_RETRIES", default_value = "3")]
        max_retries: u32,

        /// Fail executions that run longer than this many seconds
        #[arg(long, env = "CADENCE_EXECUTION_TIMEOUT")]
        execution_timeout: Option<u64>,
    },

    /// List jobs in the persistence file
    Jobs {
        /// Job persistence file
        #[arg(long, env = "CADENCE_PERSISTENCE_PATH", default_value = DEFAULT_PERSISTENCE_PATH)]
        persistence_path: PathBuf,

        /// Only show jobs with this status
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,

        /// Print raw JSON records
        #[arg(long)]
        json: bool,
    },

    /// Validate a cron expression and preview its next due times
    Cron {
        /// Five-field expression, e.g. "30 9 * * *"
        #[arg(value_name = "EXPRESSION")]
        expression: String,

        /// Start time (RFC 3339); defaults to now
        #[arg(long)]
        from: Option<String>,

        /// Number of due times to print
        #[arg(long, default_value = "3")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "cadence=info,cadence_scheduler=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            persistence_path,
            check_interval,
            max_retries,
            execution_timeout,
        } => {
            let mut config = SchedulerConfig::default()
                .with_persistence(persistence_path)
                .with_check_interval(Duration::from_secs(check_interval.max(1)))
                .with_default_max_retries(max_retries);
            if let Some(secs) = execution_timeout {
                config = config.with_execution_timeout(Duration::from_secs(secs));
            }
            daemon::run(config).await
        }

        Commands::Jobs {
            persistence_path,
            status,
            json,
        } => inspect::list_jobs(&persistence_path, status, json).await,

        Commands::Cron {
            expression,
            from,
            count,
        } => inspect::preview_cron(&expression, from.as_deref(), count),
    }
}
