use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use logistic_planner::config;
use logistic_planner::db;
use logistic_planner::locks::ShipmentLocks;
use logistic_planner::office::OfficeClient;
use logistic_planner::planner::Planner;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Run a single planner pass over all PLANNED shipments and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit with an error if any shipment could not be planned
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let office = Arc::new(OfficeClient::from_config(&cfg)?);
    // Interval is irrelevant here, only `tick` is used.
    let planner = Planner::new(pool, office, ShipmentLocks::new(), None);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let report = planner.tick(&shutdown_rx).await;
    info!(
        shipments = report.shipments_seen,
        failed = report.shipments_failed,
        assigned = report.assigned,
        rejected = report.rejected,
        "planner pass complete"
    );

    if report.shipments_failed > 0 {
        warn!(
            failed = report.shipments_failed,
            "some shipments were skipped; see warnings above"
        );
        if args.strict {
            anyhow::bail!("{} shipment(s) could not be planned", report.shipments_failed);
        }
    }
    Ok(())
}
