use async_trait::async_trait;
use chrono::NaiveDate;

use crate::db::TxContext;
use crate::error::EngineError;
use crate::inventory::model::{Batch, BatchId, NewBatch};

/// Durable batch store. The only component allowed to touch
/// `current_quantity`; every call runs inside the caller's transaction.
#[async_trait]
pub trait InventoryRepository: Send + Sync {
    /// Write surface for the inbound pipeline: creates the batch with its full
    /// initial quantity on hand.
    async fn ingest(&self, tx: &mut TxContext, batch: &NewBatch) -> Result<Batch, EngineError>;

    /// `NotFound{Batch}` on unknown id.
    async fn find_by_id(&self, tx: &mut TxContext, batch_id: BatchId)
    -> Result<Batch, EngineError>;

    /// The batch iff `current_quantity >= quantity` and `due_date > horizon`.
    /// `NotFound{Batch}` on unknown id.
    async fn find_available(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
        horizon: NaiveDate,
    ) -> Result<Option<Batch>, EngineError>;

    /// Every batch with stock on hand that is due after `horizon`, soonest first.
    async fn list_available(
        &self,
        tx: &mut TxContext,
        horizon: NaiveDate,
    ) -> Result<Vec<Batch>, EngineError>;

    /// Conditional decrement; refuses to take stock below zero
    /// (`BatchOutOfStock`).
    async fn debit(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
    ) -> Result<(), EngineError>;

    async fn credit(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
    ) -> Result<(), EngineError>;
}
