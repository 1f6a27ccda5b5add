use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

use logistic_planner::api::{self, AppState};
use logistic_planner::config;
use logistic_planner::db;
use logistic_planner::locks::ShipmentLocks;
use logistic_planner::office::{ApplicationSource, OfficeClient};
use logistic_planner::planner::Planner;
use logistic_planner::service::LogisticService;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
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
    let addr = cfg.bind_addr()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let office: Arc<dyn ApplicationSource> = Arc::new(OfficeClient::from_config(&cfg)?);
    let locks = ShipmentLocks::new();

    // Planner runs in its own task; ticks never overlap.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let planner = Planner::new(
        pool.clone(),
        office.clone(),
        locks.clone(),
        cfg.planner.interval(),
    );
    let planner_task = tokio::spawn(planner.run(shutdown_rx));

    let service = LogisticService::new(pool, office, locks);
    let app = api::router(AppState { service });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, office = %cfg.office.base_url, "logistic service listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(?err, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        })
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(err) = planner_task.await {
        error!(?err, "planner task failed");
    }
    served.context("server error")?;
    info!("logistic service stopped");
    Ok(())
}
