use serde::{Deserialize, Serialize};

use crate::cart::CartStatus;
use crate::config::AppConfig;
use crate::inventory::BatchId;

/// One `add_to_cart` request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub batch_id: BatchId,
    pub quantity: u32,
    /// Status the client asks for. Ignored for a freshly created cart.
    pub target_status: CartStatus,
}

impl LineRequest {
    pub fn new(batch_id: BatchId, quantity: u32, target_status: CartStatus) -> Self {
        Self {
            batch_id,
            quantity,
            target_status,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReservationPolicy {
    /// Batches due on or before `today + freshness_horizon_days` are not
    /// reservable.
    pub freshness_horizon_days: u32,
    pub max_tx_retries: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            freshness_horizon_days: 21,
            max_tx_retries: 3,
        }
    }
}

impl From<&AppConfig> for ReservationPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            freshness_horizon_days: cfg.freshness_horizon_days,
            max_tx_retries: cfg.max_tx_retries,
        }
    }
}

/// Outcome of one reclaim sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    pub carts_released: u64,
    pub units_returned: u64,
}
