use clap::{Parser, Subcommand};
use loadpool::config::{ConfigLoader, Overrides};
use loadpool::executor::{HttpExecutor, OperationExecutor};
use loadpool::metrics::MetricsStore;
use loadpool::output::format::{format_hms, format_number};
use loadpool::output::{ConsoleDashboard, ReportWriter};
use loadpool::poller::Poller;
use loadpool::supervisor::{Supervisor, SupervisorSettings};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "loadpool")]
#[command(version = "0.1.0")]
#[command(about = "Concurrent traffic workers with a live progress dashboard", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker pool from a config file
    Run {
        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the number of workers
        #[arg(short, long)]
        workers: Option<u32>,

        /// Override the operations each worker performs
        #[arg(short = 'n', long)]
        operations: Option<u32>,

        /// Seed for delay sampling
        #[arg(long)]
        seed: Option<u64>,

        /// Disable the live dashboard and log progress instead
        #[arg(long, default_value_t = false)]
        no_progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, workers, operations, seed, no_progress } => {
            let progress = !no_progress;
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
            } else {
                let level = logger.filter();
                log::set_boxed_logger(Box::new(logger))?;
                log::set_max_level(level);
            }

            log::info!("Loading config from {:?}", config);
            let overrides = Overrides {
                workers,
                operations_per_worker: operations,
                seed,
            };
            let cfg = ConfigLoader::load_with_overrides(&config, &overrides)?;
            log::info!("Loaded run: {}", cfg.name);

            let executor: Arc<dyn OperationExecutor> = Arc::new(HttpExecutor::from_config(&cfg)?);
            let settings = SupervisorSettings::from_config(&cfg)?;
            let store = Arc::new(MetricsStore::new(settings.target_total()));
            store.set_proxies_available(executor.proxies_available() as u64);

            if cfg.target.counter_url.is_some() {
                log::info!("Reading initial counter...");
                match executor.read_counter(&cfg.target.id).await {
                    Ok(value) => {
                        store.set_initial_counter(value);
                        log::info!("Initial counter: {}", format_number(value));
                    }
                    Err(e) => log::warn!("Could not read initial counter: {}", e),
                }
            }

            let supervisor = Arc::new(Supervisor::new(settings, executor.clone(), store.clone()));

            let on_signal = supervisor.clone();
            tokio::spawn(async move {
                let interrupts = futures::stream::unfold((), |()| async {
                    tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
                });
                if on_signal.cancel_on_interrupts(interrupts).await {
                    std::process::exit(130);
                }
            });

            let mut poller = Poller::new(
                executor.clone(),
                store.clone(),
                supervisor.cancel_signal(),
                cfg.target.id.clone(),
                cfg.workers,
                cfg.poll_interval(),
            )
            .follow_run(supervisor.watch_state())
            .with_sink(Box::new(ConsoleDashboard::new(progress.then(|| multi.clone()))));
            if let Some(report) = &cfg.report {
                poller = poller.with_sink(Box::new(ReportWriter::from_config(report)));
            }
            let poll_task = tokio::spawn(poller.run());

            let summary = supervisor.run(&cfg.target.action_url).await?;
            if let Err(e) = poll_task.await {
                log::error!("Dashboard task failed: {}", e);
            }

            let snap = &summary.snapshot;
            if summary.cancelled {
                println!("\n⏹️  Run Stopped:");
            } else {
                println!("\n✅ Run Completed:");
            }
            println!("   Workers: {} finished, {} stopped", summary.completed_workers, summary.stopped_workers);
            println!("   Succeeded: {}", format_number(snap.total_successful));
            println!("   Failed: {}", format_number(snap.total_failed));
            println!("   Success Rate: {:.1}%", snap.derived.success_rate);
            if snap.counter_known() {
                println!("   Counter Gained: {}", snap.derived.counter_gained);
            }
            println!("   Total Time: {}", format_hms(summary.duration));
        }
        Commands::Check { config } => {
            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!("   Name: {}", cfg.name);
                    println!("   Target: {} ({})", cfg.target.id, cfg.target.action_url);
                    println!("   Workers: {} x {} operations", cfg.workers, cfg.operations_per_worker);
                    println!("   Delay: {}-{}s", cfg.min_delay_secs, cfg.max_delay_secs);
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
