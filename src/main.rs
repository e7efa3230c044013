use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use worker_pulse::config::{PulseConfig, StoreConfig};
use worker_pulse::liveness::{PruneReport, Reconciler, WorkerStatus};
use worker_pulse::registry::StoreRegistry;
use worker_pulse::shutdown::install_shutdown_handler;
use worker_pulse::store::{LivenessStore, RedisStore};
use worker_pulse::worker::{Worker, WorkerId};

#[derive(Parser, Debug)]
#[command(name = "worker-pulse")]
#[command(version)]
#[command(about = "Worker heartbeats and dead-worker pruning over a shared Redis store")]
#[command(propagate_version = true)]
struct Args {
    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    timing: TimingArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Register a worker and keep its heartbeat alive until interrupted
    Beat {
        /// Worker identity (default: <hostname>:<pid>)
        #[arg(long)]
        id: Option<String>,
    },

    /// Deregister dead workers and remove orphaned heartbeats
    Prune {
        /// Keep pruning every --prune-interval-ms until interrupted
        #[arg(long)]
        watch: bool,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Show every registered worker and whether it is alive
    Status {
        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

// =============================================================================
// Shared Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Redis URL of the shared store
    #[arg(
        long,
        global = true,
        env = "PULSE_REDIS_URL",
        default_value = "redis://127.0.0.1:6379"
    )]
    redis_url: String,
}

#[derive(Parser, Debug)]
struct TimingArgs {
    /// Milliseconds between two heartbeats
    #[arg(
        long,
        global = true,
        env = "PULSE_HEARTBEAT_INTERVAL_MS",
        default_value = "2000"
    )]
    heartbeat_interval_ms: u64,

    /// Heartbeat age in milliseconds after which a worker is dead
    #[arg(
        long,
        global = true,
        env = "PULSE_STALENESS_THRESHOLD_MS",
        default_value = "5000"
    )]
    staleness_threshold_ms: u64,

    /// Milliseconds a stopping heartbeat waits for its loop and key removal
    #[arg(
        long,
        global = true,
        env = "PULSE_STOP_TIMEOUT_MS",
        default_value = "1000"
    )]
    stop_timeout_ms: u64,

    /// Milliseconds between two passes of `prune --watch`
    #[arg(
        long,
        global = true,
        env = "PULSE_PRUNE_INTERVAL_MS",
        default_value = "10000"
    )]
    prune_interval_ms: u64,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct StatusOutput {
    checked_at: String,
    staleness_threshold_ms: u64,
    workers: Vec<WorkerStatus>,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_beat(
    store: Arc<dyn LivenessStore>,
    config: PulseConfig,
    id: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler()?;
    let id = id
        .map(WorkerId::from)
        .unwrap_or_else(WorkerId::for_current_process);

    let mut worker = Worker::new(id, store, config);
    worker.startup().await?;
    tracing::info!(worker_id = %worker.id(), "Worker running, interrupt to stop");

    shutdown.cancelled().await;

    if let Err(e) = worker.shutdown().await {
        tracing::warn!(
            worker_id = %worker.id(),
            error = %e,
            "Deregistration failed, leaving cleanup to the pruner"
        );
    }
    Ok(())
}

async fn run_prune(
    reconciler: Reconciler,
    config: &PulseConfig,
    watch: bool,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if watch {
        let shutdown = install_shutdown_handler()?;
        tracing::info!(
            interval_ms = config.prune_interval_ms,
            "Pruning periodically, interrupt to stop"
        );
        reconciler
            .run_periodic(config.prune_interval(), shutdown, |report| {
                if let Err(e) = print_report(report, output_format) {
                    tracing::warn!(error = %e, "Unable to print prune report");
                }
            })
            .await;
        return Ok(());
    }

    let report = reconciler.prune_all().await;
    print_report(&report, output_format)?;
    if let Some(error) = report.error {
        return Err(format!("prune pass aborted: {}", error).into());
    }
    Ok(())
}

fn print_report(
    report: &PruneReport,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Table => {
            if report.is_noop() {
                println!("Nothing to prune.");
            }
            for id in &report.pruned {
                println!("pruned worker   {}", id);
            }
            for key in &report.orphans_removed {
                println!("removed orphan  {}", key);
            }
        }
    }
    Ok(())
}

async fn run_status(
    reconciler: Reconciler,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let workers = reconciler.status_at(now).await?;

    match output_format {
        OutputFormat::Json => {
            let output = StatusOutput {
                checked_at: now.to_rfc3339(),
                staleness_threshold_ms: reconciler.policy().threshold().as_millis() as u64,
                workers,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if workers.is_empty() {
                println!("No registered workers.");
                return Ok(());
            }
            println!("{:<40} {:<8} LAST BEAT", "WORKER", "STATUS");
            println!("{}", "-".repeat(80));
            for worker in &workers {
                let status = if worker.alive { "alive" } else { "dead" };
                let last_beat = match (&worker.last_beat, &worker.started_at) {
                    (Some(beat), _) => beat.clone(),
                    (None, Some(started)) => format!("never (started {})", started),
                    (None, None) => "never".to_string(),
                };
                println!("{:<40} {:<8} {}", worker.id, status, last_beat);
            }
            let alive = workers.iter().filter(|w| w.alive).count();
            println!();
            println!("{} of {} workers alive", alive, workers.len());
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = PulseConfig::default()
        .with_heartbeat_interval_ms(args.timing.heartbeat_interval_ms)
        .with_staleness_threshold_ms(args.timing.staleness_threshold_ms)
        .with_stop_timeout_ms(args.timing.stop_timeout_ms)
        .with_prune_interval_ms(args.timing.prune_interval_ms);
    config.validate()?;

    let store_config = StoreConfig {
        url: args.store.redis_url,
    };
    let store: Arc<dyn LivenessStore> = Arc::new(RedisStore::connect(&store_config.url).await?);

    match args.command {
        Commands::Beat { id } => {
            run_beat(store, config, id).await?;
        }
        Commands::Prune { watch, output } => {
            let registry = Arc::new(StoreRegistry::new(store.clone()));
            let reconciler = Reconciler::from_config(store, registry, &config);
            run_prune(reconciler, &config, watch, &output).await?;
        }
        Commands::Status { output } => {
            let registry = Arc::new(StoreRegistry::new(store.clone()));
            let reconciler = Reconciler::from_config(store, registry, &config);
            run_status(reconciler, &output).await?;
        }
    }

    Ok(())
}
