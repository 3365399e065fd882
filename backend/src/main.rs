use std::sync::Arc;

use cart_backend::{
    config::AppConfig,
    db::Db,
    metrics::Counters,
    reclaimer::Reclaimer,
    reservation::{ReservationEngine, ReservationPolicy},
    time::SystemClock,
};
use common::logger::init_logger;
use tokio::sync::watch;

/// Connects to the store and brings the schema up to date.
async fn init_db(cfg: &AppConfig) -> anyhow::Result<Db> {
    let db = Db::connect(&cfg.database_url, cfg.db_max_connections).await?;
    db.migrate().await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env();
    init_logger("cart-backend", cfg.json_logs);

    tracing::info!("Starting cart backend...");

    let db = init_db(&cfg).await?;
    let counters = Counters::default();

    let engine = ReservationEngine::new(
        db,
        Arc::new(SystemClock),
        ReservationPolicy::from(&cfg),
        counters.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reclaimer = Reclaimer::from_config(engine, &cfg).spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    shutdown_tx.send(true)?;
    reclaimer.await?;

    tracing::info!(counters = ?counters.snapshot(), "cart backend stopped");

    Ok(())
}
