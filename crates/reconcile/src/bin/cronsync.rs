//! cronsync: post-deploy schedule synchronizer.
//!
//! Reads a deployment-completed event (JSON, from a file or stdin), resolves
//! each deployed function's `cronjob` section, and converges the region's
//! EventBridge rules, Lambda invoke permissions and rule targets onto it.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use cronsync_backend::AwsBackendFactory;
use cronsync_core::config::{load_dotenv, Config};
use cronsync_core::DeploymentEvent;
use cronsync_reconcile::{cancel_pair, Coordinator};

// ── CLI ─────────────────────────────────────────────────────────────

/// Synchronize declared function schedules with EventBridge.
#[derive(Parser, Debug)]
#[command(name = "cronsync", version, about)]
struct Cli {
    /// Deployment event JSON file, or `-` for stdin.
    #[arg(long, env = "CRONSYNC_EVENT", default_value = "-")]
    event: String,

    /// Config profile (overrides CRONSYNC_PROFILE).
    #[arg(long)]
    profile: Option<String>,

    /// Project root holding `<component>/<module>/<function>/s-function.json`.
    #[arg(long)]
    project_path: Option<PathBuf>,

    /// Deploy stage (the event's own stage still wins).
    #[arg(long)]
    stage: Option<String>,

    /// Max bindings reconciled at once per region.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Exit non-zero when any binding failed.
    #[arg(long)]
    strict: bool,
}

fn read_event(source: &str) -> anyhow::Result<DeploymentEvent> {
    let event = if source == "-" {
        DeploymentEvent::from_reader(io::stdin().lock())?
    } else {
        let file = File::open(source)
            .map_err(|e| anyhow::anyhow!("cannot open event file {source}: {e}"))?;
        DeploymentEvent::from_reader(BufReader::new(file))?
    };
    Ok(event)
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = match &cli.profile {
        Some(profile) => Config::for_profile(profile),
        None => Config::from_env(),
    };
    if let Some(path) = cli.project_path {
        config.reconcile.project_path = path;
    }
    if let Some(stage) = cli.stage {
        config.reconcile.stage = stage;
    }
    if let Some(concurrency) = cli.concurrency {
        config.reconcile.concurrency = concurrency.max(1);
    }
    config.log_summary();

    let event = read_event(&cli.event)?;
    info!(
        regions = event.deployed.len(),
        records = event.record_count(),
        "Deployment event loaded"
    );

    let (cancel, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight bindings");
            cancel.cancel();
        }
    });

    let factory = Arc::new(AwsBackendFactory::new(config.aws.clone()));
    let coordinator = Coordinator::from_config(factory, &config.reconcile).with_cancel(signal);

    let errors = coordinator.run(event).await;

    if errors.is_empty() {
        info!("cronsync finished cleanly");
        return Ok(());
    }

    for e in &errors {
        error!("{e}");
    }

    if cli.strict {
        anyhow::bail!("{} schedule binding(s) failed", errors.len());
    }

    warn!(failures = errors.len(), "cronsync finished with failures (not strict)");
    Ok(())
}
