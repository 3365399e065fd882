use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::buyer::BuyerId;
use crate::cart::model::{Cart, CartId, CartStatus};
use crate::db::TxContext;
use crate::error::EngineError;
use crate::inventory::BatchId;

/// Durable cart store. Carts come back with their lines attached, in
/// insertion order, each line carrying its batch's product and due date.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Creates an empty OPENED, unreserved cart dated `tx.today()`.
    /// A second open cart for the same buyer surfaces as `Transient`.
    async fn insert(&self, tx: &mut TxContext, buyer_id: BuyerId) -> Result<Cart, EngineError>;

    async fn find_open_by_buyer(
        &self,
        tx: &mut TxContext,
        buyer_id: BuyerId,
    ) -> Result<Option<Cart>, EngineError>;

    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
    ) -> Result<Option<Cart>, EngineError>;

    async fn find_by_id_and_buyer(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<Option<Cart>, EngineError>;

    /// Carts in `status` still holding their reservation whose last touch is
    /// strictly before `updated_before`, stalest first.
    async fn find_idle(
        &self,
        tx: &mut TxContext,
        status: CartStatus,
        updated_before: NaiveDateTime,
    ) -> Result<Vec<Cart>, EngineError>;

    /// Writes the header and upserts every line. Existing lines keep their
    /// original `unit_price` and position. Writing to a cart that is already
    /// CLOSED in the store fails with `AlreadyClosed`.
    async fn save(&self, tx: &mut TxContext, cart: &Cart) -> Result<(), EngineError>;

    /// `NotFound{CartLine}` when the cart has no line for the batch.
    async fn delete_line(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        batch_id: BatchId,
    ) -> Result<(), EngineError>;

    async fn delete_lines(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        batch_ids: &[BatchId],
    ) -> Result<u64, EngineError>;

    /// Clears `reserved` iff the cart is still OPENED, still reserved and
    /// still idle as of `updated_before`. Returns whether it flipped.
    async fn release_if_idle(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        updated_before: NaiveDateTime,
    ) -> Result<bool, EngineError>;
}
