use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

pub type BatchId = i64;

/// A dated inventory lot of a single product.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub product_id: i64,
    pub section_id: i64,
    pub product_price: Decimal,
    /// Quantity at ingestion; `current_quantity` never exceeds it.
    pub initial_quantity: u32,
    pub current_quantity: u32,
    pub due_date: NaiveDate,
}

impl Batch {
    /// Availability predicate used for every reservation: enough stock and a
    /// due date strictly after the freshness horizon.
    pub fn can_satisfy(&self, quantity: u32, horizon: NaiveDate) -> bool {
        self.current_quantity >= quantity && self.due_date > horizon
    }
}

/// Batch as handed over by the inbound pipeline.
#[derive(Clone, Debug)]
pub struct NewBatch {
    pub batch_id: BatchId,
    pub product_id: i64,
    pub section_id: i64,
    pub product_price: Decimal,
    pub initial_quantity: u32,
    pub due_date: NaiveDate,
}

/// Last due date that is still too close to sell: `today + days`.
pub fn freshness_horizon(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_add_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MAX)
}
