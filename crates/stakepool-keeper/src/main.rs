use std::time::Duration;

use clap::Parser;
use tokio::time;

use stakepool_keeper::{create_example_config, Keeper, KeeperConfig};

#[derive(Parser, Debug)]
#[command(name = "stakepool-keeper")]
#[command(about = "Replays staking pool events through the accounting core")]
struct Args {
    /// Path to keeper configuration file
    #[arg(short, long, default_value = "keeper.toml")]
    config: String,

    /// Event journal path (overrides the configuration)
    #[arg(short, long)]
    journal: Option<String>,

    /// Snapshot path (overrides the configuration)
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Poll interval in seconds (overrides the configuration)
    #[arg(short, long)]
    interval: Option<u64>,

    /// Process the journal once and exit
    #[arg(long)]
    once: bool,

    /// Dry run mode - apply events but don't persist the snapshot
    #[arg(long)]
    dry_run: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Write an example configuration to --config and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "info" })
    ).init();

    if args.init_config {
        create_example_config(&args.config)?;
        log::info!("Wrote example configuration to {}", args.config);
        return Ok(());
    }

    log::info!("Starting staking pool keeper");

    if args.dry_run {
        log::warn!("Running in DRY RUN mode - snapshots will not be written");
    }

    // Load configuration
    let mut config = KeeperConfig::load(&args.config)?;
    if let Some(journal) = args.journal {
        config.journal_path = journal;
    }
    if let Some(snapshot) = args.snapshot {
        config.snapshot_path = snapshot;
    }
    if let Some(interval) = args.interval {
        config.poll_interval = interval.max(1);
    }

    log::info!("Journal: {}", config.journal_path);
    log::info!("Snapshot: {}", config.snapshot_path);
    log::info!("Loaded configuration for {} modules", config.modules.len());

    let poll_interval = config.poll_interval;
    let mut keeper = Keeper::new(config, args.dry_run).await?;

    log::info!("Keeper initialized after {} journal events", keeper.events_applied());

    if args.once {
        let summary = keeper.process_journal().await?;
        log::info!("Applied {} events, {} rejected", summary.applied, summary.failed);
        keeper.health_check()?;
        return Ok(());
    }

    // Start main polling loop
    let mut interval_timer = time::interval(Duration::from_secs(poll_interval));
    let mut iteration = 0u64;

    loop {
        interval_timer.tick().await;
        iteration += 1;

        log::debug!("Starting keeper iteration {}", iteration);

        match keeper.process_journal().await {
            Ok(summary) => {
                if summary.applied + summary.failed > 0 {
                    log::info!(
                        "Iteration {}: applied {} events, {} rejected",
                        iteration,
                        summary.applied,
                        summary.failed
                    );
                } else {
                    log::debug!("Iteration {}: no new events", iteration);
                }
            }
            Err(e) => {
                log::error!("Error in keeper iteration {}: {}", iteration, e);
                // Keep polling; a malformed line stays unapplied until fixed
            }
        }

        // Basic health check every 100 iterations
        if iteration % 100 == 0 {
            log::info!("Keeper health check - iteration {}", iteration);
            if let Err(e) = keeper.health_check() {
                log::warn!("Health check warning: {}", e);
            }
        }
    }
}
