mod catalog;
mod cli;
mod config;
mod report;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use reachability::probe::PingProbe;
use reachability::{CancellationToken, CheckOrchestrator, RunEvent, RunStatus};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::cli::{Cli, Commands, RunArgs};
use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;

    let format = cli.log_format.unwrap_or_else(|| logger::format_from_env(config.logging.format));
    logger::init(format, config.logging.level_filter()).context("installing log subscriber")?;

    match cli.cmd {
        Commands::Run(args) => run(args, config).await,
        Commands::Ping { host, samples } => ping(&host, samples, &config).await,
        Commands::Config => {
            println!("{config}");
            Ok(())
        }
    }
}

async fn run(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let run_config = args.apply(config.run);
    let catalog = Catalog::load(&args.endpoints)?;
    if catalog.rejected > 0 {
        warn!(rejected = catalog.rejected, "some catalog entries were skipped");
    }
    let prior = match &args.prior {
        Some(path) => report::load_table(path)?,
        None => Default::default(),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let orchestrator = CheckOrchestrator::network(run_config)?.with_events(tx);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling run");
            on_signal.cancel();
        }
    });

    let events = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::PhaseChanged(phase) => debug!(%phase, "phase"),
                RunEvent::Progress { completed, total } => info!(completed, total, "progress"),
                RunEvent::TargetUpdated(result) => {
                    debug!(key = %result.key, available = result.is_available(), "target updated")
                }
                RunEvent::Interference { key, results } => {
                    let flagged = results.iter().filter(|r| r.is_blocking).count();
                    if flagged > 0 {
                        warn!(%key, flagged, "interference probes flagged the target");
                    }
                }
            }
        }
    });

    let summary = orchestrator.run(&catalog.endpoints, prior, cancel).await;
    drop(orchestrator);
    let _ = events.await;

    if let Some(path) = args.output_path() {
        report::write_table(&summary.table, path)?;
        info!(path = %path.display(), "results written");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", report::render(&summary));
    }

    if summary.status == RunStatus::Cancelled {
        anyhow::bail!("run cancelled with {} target(s) checked", summary.checked);
    }
    Ok(())
}

async fn ping(host: &str, samples: u32, config: &Config) -> anyhow::Result<()> {
    let probe = PingProbe::new(Duration::from_millis(config.run.timeouts.ping_ms));
    let stats = probe.diagnose(host, samples).await?;

    println!("{host}: {}/{} replies, {:.1}% loss", stats.received, stats.sent, stats.loss_percent);
    if let Some(avg) = stats.avg_ms {
        println!("  average rtt {avg:.1}ms");
    }
    if let (Some(ttl), Some(hops)) = (stats.ttl, stats.hops) {
        println!("  ttl {ttl}, about {hops} hops away");
    }
    Ok(())
}
