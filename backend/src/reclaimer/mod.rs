//! Abandonment reclaimer.
//!
//! A plain tick loop: every `interval`, release the stock held by OPENED carts
//! that nobody touched for `idle_threshold`. A tick that overruns delays the
//! next one; ticks never overlap. The loop exits when the shutdown channel
//! flips to `true` or its sender is dropped.

use std::time::Duration;

use common::logger::{TraceId, root_span};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error, info};

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::reservation::{ReclaimReport, ReservationEngine};

pub struct Reclaimer {
    engine: ReservationEngine,
    interval: Duration,
    idle_threshold: Duration,
}

impl Reclaimer {
    pub fn new(engine: ReservationEngine, interval: Duration, idle_threshold: Duration) -> Self {
        Self {
            engine,
            interval,
            idle_threshold,
        }
    }

    pub fn from_config(engine: ReservationEngine, cfg: &AppConfig) -> Self {
        Self::new(engine, cfg.reclaimer_interval, cfg.reclaimer_idle_threshold)
    }

    /// One sweep, under its own root span.
    pub async fn tick(&self) -> Result<ReclaimReport, EngineError> {
        let trace_id = TraceId::new();
        let span = root_span("reclaimer_tick", &trace_id);

        async {
            let report = self.engine.reclaim_idle(self.idle_threshold).await?;

            if report.carts_released > 0 {
                info!(
                    carts = report.carts_released,
                    units = report.units_returned,
                    "reclaimed idle carts"
                );
            } else {
                debug!("no idle carts");
            }

            Ok::<_, EngineError>(report)
        }
        .instrument(span)
        .await
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.interval.as_secs(),
            idle_secs = self.idle_threshold.as_secs(),
            "reclaimer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, "reclaimer tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reclaimer stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
