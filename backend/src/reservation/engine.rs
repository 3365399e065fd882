use std::sync::Arc;
use std::time::Duration;

use common::logger::{child_span, warn_if_slow};
use tracing::{Instrument, debug, field, info, instrument, warn};

use crate::buyer::{BuyerId, BuyerRepository, SqlxBuyerRepository};
use crate::cart::{
    Cart, CartId, CartLine, CartRepository, CartStatus, CartView, LineView, SqlxCartRepository,
};
use crate::db::{Db, TxContext};
use crate::error::{EngineError, Entity};
use crate::inventory::{
    Batch, BatchId, InventoryRepository, NewBatch, SqlxInventoryRepository, freshness_horizon,
};
use crate::metrics::{Counters, Tally};
use crate::reservation::retry::with_retries;
use crate::reservation::types::{LineRequest, ReclaimReport, ReservationPolicy};
use crate::time::Clock;

const SLOW_TX: Duration = Duration::from_millis(100);

/// Coordinates the inventory and cart stores under one transaction per
/// operation.
///
/// Cloning is cheap; clones share the pool, the stores and the counters.
#[derive(Clone)]
pub struct ReservationEngine {
    db: Db,
    clock: Arc<dyn Clock>,

    inventory: Arc<dyn InventoryRepository>,
    carts: Arc<dyn CartRepository>,
    buyers: Arc<dyn BuyerRepository>,

    policy: ReservationPolicy,

    /// Observability counters (does not affect behavior).
    counters: Counters,
}

impl ReservationEngine {
    /// Engine over the SQL stores.
    pub fn new(
        db: Db,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
        counters: Counters,
    ) -> Self {
        Self::with_stores(
            db,
            clock,
            Arc::new(SqlxInventoryRepository::new()),
            Arc::new(SqlxCartRepository::new()),
            Arc::new(SqlxBuyerRepository::new()),
            policy,
            counters,
        )
    }

    pub fn with_stores(
        db: Db,
        clock: Arc<dyn Clock>,
        inventory: Arc<dyn InventoryRepository>,
        carts: Arc<dyn CartRepository>,
        buyers: Arc<dyn BuyerRepository>,
        policy: ReservationPolicy,
        counters: Counters,
    ) -> Self {
        Self {
            db,
            clock,
            inventory,
            carts,
            buyers,
            policy,
            counters,
        }
    }

    async fn begin(&self) -> Result<TxContext, EngineError> {
        Ok(self.db.begin(self.clock.as_ref()).await?)
    }

    fn horizon(&self, tx: &TxContext) -> chrono::NaiveDate {
        freshness_horizon(tx.today(), self.policy.freshness_horizon_days)
    }

    /* =========================
    Buyer-facing operations
    ========================= */

    /// Reserves `request.quantity` units of `request.batch_id` into the
    /// buyer's open cart, creating the cart on first use.
    ///
    /// A dormant cart is re-reserved first. The requested status is applied to
    /// an existing cart once the new line is reserved and nothing was pruned;
    /// a cart created by this call always starts OPENED.
    #[instrument(
        skip(self, request),
        target = "reservation",
        fields(
            batch_id = request.batch_id,
            quantity = request.quantity,
            cart_id = field::Empty
        )
    )]
    pub async fn add_to_cart(
        &self,
        buyer_id: BuyerId,
        request: LineRequest,
    ) -> Result<CartView, EngineError> {
        if request.quantity == 0 {
            return Err(EngineError::InvalidRequest(
                "quantity must be positive".to_string(),
            ));
        }

        let this = self;
        with_retries(
            "add_to_cart",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tally = Tally::default();
                let mut tx = this.begin().await?;
                let view = warn_if_slow(
                    "add_to_cart",
                    SLOW_TX,
                    this.add_in_tx(&mut tx, &mut tally, buyer_id, request),
                )
                .await?;
                tx.commit().await?;
                tally.apply(&this.counters);
                Ok::<_, EngineError>(view)
            },
        )
        .await
    }

    /// Closes the cart unless re-reserving a dormant cart pruned lines, in
    /// which case it stays OPENED for the buyer to review.
    #[instrument(skip(self), target = "reservation")]
    pub async fn close_cart(
        &self,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<CartView, EngineError> {
        let this = self;
        with_retries(
            "close_cart",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tally = Tally::default();
                let mut tx = this.begin().await?;
                let view = warn_if_slow(
                    "close_cart",
                    SLOW_TX,
                    this.close_in_tx(&mut tx, &mut tally, cart_id, buyer_id),
                )
                .await?;
                tx.commit().await?;
                tally.apply(&this.counters);
                Ok::<_, EngineError>(view)
            },
        )
        .await
    }

    /// Deletes one line, returning its units to the batch when the cart holds
    /// a reservation.
    #[instrument(skip(self), target = "reservation")]
    pub async fn remove_line(
        &self,
        cart_id: CartId,
        batch_id: BatchId,
        buyer_id: BuyerId,
    ) -> Result<(), EngineError> {
        let this = self;
        with_retries(
            "remove_line",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tally = Tally::default();
                let mut tx = this.begin().await?;
                this.remove_in_tx(&mut tx, &mut tally, cart_id, batch_id, buyer_id)
                    .await?;
                tx.commit().await?;
                tally.apply(&this.counters);
                Ok::<_, EngineError>(())
            },
        )
        .await
    }

    #[instrument(skip(self), target = "reservation")]
    pub async fn list_lines(
        &self,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<Vec<LineView>, EngineError> {
        let this = self;
        with_retries(
            "list_lines",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tx = this.begin().await?;
                let cart = this
                    .carts
                    .find_by_id_and_buyer(&mut tx, cart_id, buyer_id)
                    .await?
                    .ok_or_else(|| EngineError::not_found(Entity::Cart, cart_id))?;
                tx.rollback().await?;
                Ok::<Vec<LineView>, EngineError>(cart.lines.iter().map(LineView::from).collect())
            },
        )
        .await
    }

    /// Batches with stock on hand that are due after today's freshness
    /// horizon, soonest first.
    pub async fn available_batches(&self) -> Result<Vec<Batch>, EngineError> {
        let this = self;
        with_retries(
            "available_batches",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tx = this.begin().await?;
                let horizon = this.horizon(&tx);
                let batches = this.inventory.list_available(&mut tx, horizon).await?;
                tx.rollback().await?;
                Ok::<_, EngineError>(batches)
            },
        )
        .await
    }

    /* =========================
    System operations
    ========================= */

    /// Releases every OPENED reserved cart idle for longer than `idle`.
    ///
    /// Candidates are enumerated once; each cart is then released in its own
    /// transaction, re-checking idleness so a cart touched in between is left
    /// alone. A cart that fails is logged and skipped.
    #[instrument(skip(self), target = "reclaimer", fields(idle_secs = idle.as_secs()))]
    pub async fn reclaim_idle(&self, idle: Duration) -> Result<ReclaimReport, EngineError> {
        let threshold = chrono::Duration::from_std(idle).map_err(|_| {
            EngineError::InvalidRequest(format!("idle threshold out of range: {idle:?}"))
        })?;

        let this = self;
        let (cutoff, candidates) = with_retries(
            "reclaim_scan",
            self.policy.max_tx_retries,
            &self.counters,
            move || async move {
                let mut tx = this.begin().await?;
                let cutoff = tx
                    .now()
                    .checked_sub_signed(threshold)
                    .unwrap_or(chrono::NaiveDateTime::MIN);
                let idle = this
                    .carts
                    .find_idle(&mut tx, CartStatus::Opened, cutoff)
                    .await?;
                tx.commit().await?;
                Ok::<_, EngineError>((cutoff, idle))
            },
        )
        .await?;

        let mut report = ReclaimReport::default();

        for cart in candidates {
            let cart_id = cart.cart_id;
            let span = child_span("reclaim_cart");
            span.record("cart_id", cart_id);

            let released = with_retries(
                "reclaim_cart",
                self.policy.max_tx_retries,
                &self.counters,
                move || async move {
                    let mut tx = this.begin().await?;
                    let units = this.release_in_tx(&mut tx, cart_id, cutoff).await?;
                    tx.commit().await?;
                    Ok::<_, EngineError>(units)
                },
            )
            .instrument(span)
            .await;

            match released {
                Ok(Some(units)) => {
                    report.carts_released += 1;
                    report.units_returned += units;
                    debug!(cart_id, units, "released idle cart");
                }
                Ok(None) => {
                    debug!(cart_id, "cart no longer idle; skipped");
                }
                Err(e) => {
                    warn!(cart_id, error = %e, "failed to release idle cart");
                }
            }
        }

        Counters::add(&self.counters.carts_reclaimed, report.carts_released);
        Counters::add(&self.counters.units_reclaimed, report.units_returned);

        Ok(report)
    }

    /* =========================
    Inbound surface
    ========================= */

    pub async fn ingest_batch(&self, batch: NewBatch) -> Result<Batch, EngineError> {
        let mut tx = self.begin().await?;
        let stored = self.inventory.ingest(&mut tx, &batch).await?;
        tx.commit().await?;
        info!(batch_id = stored.batch_id, quantity = stored.initial_quantity, "batch ingested");
        Ok(stored)
    }

    pub async fn register_buyer(&self, buyer_id: BuyerId, name: &str) -> Result<(), EngineError> {
        let mut tx = self.begin().await?;
        self.buyers.register(&mut tx, buyer_id, name).await?;
        tx.commit().await?;
        Ok(())
    }

    /* =========================
    Transaction bodies
    ========================= */

    async fn add_in_tx(
        &self,
        tx: &mut TxContext,
        tally: &mut Tally,
        buyer_id: BuyerId,
        request: LineRequest,
    ) -> Result<CartView, EngineError> {
        if !self.buyers.exists(tx, buyer_id).await? {
            return Err(EngineError::not_found(Entity::Buyer, buyer_id));
        }

        let (mut cart, created) = match self.carts.find_open_by_buyer(tx, buyer_id).await? {
            Some(cart) => (cart, false),
            None => {
                let cart = self.carts.insert(tx, buyer_id).await?;
                tally.carts_opened += 1;
                info!(cart_id = cart.cart_id, "opened cart");
                (cart, true)
            }
        };
        tracing::Span::current().record("cart_id", cart.cart_id);

        cart.touch(tx.now());
        let horizon = self.horizon(tx);
        let pruned = self.ensure_reserved(tx, tally, &mut cart, horizon).await?;

        let Some(batch) = self
            .inventory
            .find_available(tx, request.batch_id, request.quantity, horizon)
            .await?
        else {
            Counters::incr(&self.counters.out_of_stock);
            info!(batch_id = request.batch_id, "batch cannot satisfy request");
            return Err(EngineError::BatchOutOfStock {
                batch_id: request.batch_id,
            });
        };

        debug_assert!(batch.can_satisfy(request.quantity, horizon));
        self.inventory
            .debit(tx, batch.batch_id, request.quantity)
            .await?;

        let position = cart.next_position();
        match cart.line_mut(batch.batch_id) {
            Some(line) => {
                line.quantity = line.quantity.checked_add(request.quantity).ok_or_else(|| {
                    EngineError::InvalidRequest("line quantity overflow".to_string())
                })?;
            }
            None => cart.lines.push(CartLine {
                batch_id: batch.batch_id,
                quantity: request.quantity,
                unit_price: batch.product_price,
                position,
                product_id: batch.product_id,
                due_date: batch.due_date,
            }),
        }
        tally.lines_reserved += 1;

        cart.reserved = true;

        if !created && pruned == 0 && request.target_status == CartStatus::Closed {
            cart.status = CartStatus::Closed;
            tally.carts_closed += 1;
            info!(cart_id = cart.cart_id, "cart closed on add");
        }

        self.carts.save(tx, &cart).await?;

        Ok(CartView::from(&cart))
    }

    async fn close_in_tx(
        &self,
        tx: &mut TxContext,
        tally: &mut Tally,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<CartView, EngineError> {
        let mut cart = self.load_mutable(tx, cart_id, buyer_id).await?;

        let lines_before = cart.lines.len();
        let horizon = self.horizon(tx);
        self.ensure_reserved(tx, tally, &mut cart, horizon).await?;

        if cart.lines.len() == lines_before {
            cart.status = CartStatus::Closed;
            tally.carts_closed += 1;
            info!(cart_id, "cart closed");
        } else {
            info!(
                cart_id,
                dropped = lines_before - cart.lines.len(),
                "lines pruned; cart left open for review"
            );
        }

        cart.touch(tx.now());
        self.carts.save(tx, &cart).await?;

        Ok(CartView::from(&cart))
    }

    async fn remove_in_tx(
        &self,
        tx: &mut TxContext,
        tally: &mut Tally,
        cart_id: CartId,
        batch_id: BatchId,
        buyer_id: BuyerId,
    ) -> Result<(), EngineError> {
        let mut cart = self.load_mutable(tx, cart_id, buyer_id).await?;

        // Unknown batch ids fail as Batch, not CartLine.
        self.inventory.find_by_id(tx, batch_id).await?;

        let Some(quantity) = cart.line(batch_id).map(|l| l.quantity) else {
            return Err(EngineError::not_found(
                Entity::CartLine,
                format!("{cart_id}/{batch_id}"),
            ));
        };

        if cart.reserved {
            self.inventory.credit(tx, batch_id, quantity).await?;
        }

        self.carts.delete_line(tx, cart_id, batch_id).await?;
        cart.lines.retain(|l| l.batch_id != batch_id);
        tally.lines_removed += 1;

        cart.touch(tx.now());
        self.carts.save(tx, &cart).await?;

        info!(cart_id, batch_id, quantity, credited = cart.reserved, "line removed");
        Ok(())
    }

    /// Flips a still-idle cart to dormant and credits its lines back.
    /// `None` when the cart was touched, closed or released since the scan.
    async fn release_in_tx(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        cutoff: chrono::NaiveDateTime,
    ) -> Result<Option<u64>, EngineError> {
        if !self.carts.release_if_idle(tx, cart_id, cutoff).await? {
            return Ok(None);
        }

        let cart = self
            .carts
            .find_by_id(tx, cart_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Entity::Cart, cart_id))?;

        let mut units = 0u64;
        for line in &cart.lines {
            self.inventory.credit(tx, line.batch_id, line.quantity).await?;
            units += u64::from(line.quantity);
        }

        Ok(Some(units))
    }

    /* =========================
    Helpers
    ========================= */

    /// Loads a cart the buyer may mutate.
    async fn load_mutable(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<Cart, EngineError> {
        let cart = self
            .carts
            .find_by_id(tx, cart_id)
            .await?
            .ok_or_else(|| EngineError::not_found(Entity::PurchaseOrder, cart_id))?;

        if cart.buyer_id != buyer_id {
            return Err(EngineError::UnauthorizedBuyer { buyer_id, cart_id });
        }
        if cart.is_closed() {
            return Err(EngineError::AlreadyClosed { cart_id });
        }

        Ok(cart)
    }

    /// Re-reserves a dormant cart at current inventory.
    ///
    /// Lines are retried in insertion order; a line whose batch can no longer
    /// satisfy it is dropped instead of failing the operation. Returns the
    /// number of dropped lines. No-op on a reserved cart.
    async fn ensure_reserved(
        &self,
        tx: &mut TxContext,
        tally: &mut Tally,
        cart: &mut Cart,
        horizon: chrono::NaiveDate,
    ) -> Result<usize, EngineError> {
        if cart.reserved {
            return Ok(0);
        }

        let mut dropped: Vec<BatchId> = Vec::new();
        for line in &cart.lines {
            match self
                .inventory
                .find_available(tx, line.batch_id, line.quantity, horizon)
                .await
            {
                Ok(Some(_)) => {
                    self.inventory
                        .debit(tx, line.batch_id, line.quantity)
                        .await?;
                }
                Ok(None) | Err(EngineError::NotFound { .. }) => {
                    info!(
                        cart_id = cart.cart_id,
                        batch_id = line.batch_id,
                        quantity = line.quantity,
                        "line no longer reservable; dropping"
                    );
                    dropped.push(line.batch_id);
                }
                Err(e) => return Err(e),
            }
        }

        if !dropped.is_empty() {
            self.carts.delete_lines(tx, cart.cart_id, &dropped).await?;
            cart.lines.retain(|l| !dropped.contains(&l.batch_id));
            tally.lines_pruned += dropped.len() as u64;
        }

        cart.reserved = true;
        Ok(dropped.len())
    }
}
