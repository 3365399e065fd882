#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Days, NaiveDate, NaiveDateTime};
use sqlx::Row;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use cart_backend::buyer::BuyerId;
use cart_backend::cart::CartId;
use cart_backend::db::Db;
use cart_backend::inventory::{BatchId, NewBatch};
use cart_backend::metrics::Counters;
use cart_backend::reservation::{ReservationEngine, ReservationPolicy};
use cart_backend::time::{FixedClock, to_epoch_ms};

pub const U1: BuyerId = 1;
pub const U2: BuyerId = 2;
pub const B1: BatchId = 1;

/// Helper to setup an isolated, unique in-memory SQLite database.
///
/// One connection, never recycled: every transaction is serialized on it and
/// the shared-cache database lives as long as the pool.
pub async fn setup_db() -> Db {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&conn_str)
        .await
        .unwrap();

    let db = Db::from_pool(pool);
    db.migrate().await.unwrap();
    db
}

/// A throwaway database file behind a pool of `max_connections`. Unlike the
/// in-memory pool, transactions here genuinely run side by side. The file is
/// removed when the returned guard drops.
pub async fn setup_file_db(max_connections: u32) -> (Db, TempDbFile) {
    sqlx::any::install_default_drivers();

    let path = std::env::temp_dir().join(format!("cart-backend-{}.db", Uuid::new_v4()));
    let conn_str = format!("sqlite://{}?mode=rwc", path.display());

    let pool = AnyPoolOptions::new()
        .max_connections(max_connections)
        .connect(&conn_str)
        .await
        .unwrap();

    let db = Db::from_pool(pool);
    db.migrate().await.unwrap();
    (db, TempDbFile(path))
}

pub struct TempDbFile(PathBuf);

impl Drop for TempDbFile {
    fn drop(&mut self) {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut p = self.0.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(p);
        }
    }
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

pub fn noon() -> NaiveDateTime {
    today().and_hms_opt(12, 0, 0).unwrap()
}

pub fn days_from_today(days: u64) -> NaiveDate {
    today().checked_add_days(Days::new(days)).unwrap()
}

pub fn batch(batch_id: BatchId, price: &str, quantity: u32, due_date: NaiveDate) -> NewBatch {
    NewBatch {
        batch_id,
        product_id: 100 + batch_id,
        section_id: 1,
        product_price: price.parse().unwrap(),
        initial_quantity: quantity,
        due_date,
    }
}

/// Engine over a fresh database with the clock pinned at noon, buyers U1/U2
/// registered and batch B1 (10.00, 50 units, due in 60 days) ingested.
pub struct Fixture {
    pub db: Db,
    pub clock: Arc<FixedClock>,
    pub counters: Counters,
    pub engine: ReservationEngine,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::seeded(setup_db().await).await
    }

    /// Same seed data as [`Fixture::new`] over a caller-supplied database.
    pub async fn seeded(db: Db) -> Self {
        let fx = Self::with_db(db);
        fx.engine.register_buyer(U1, "buyer-one").await.unwrap();
        fx.engine.register_buyer(U2, "buyer-two").await.unwrap();
        fx.engine
            .ingest_batch(batch(B1, "10.00", 50, days_from_today(60)))
            .await
            .unwrap();
        fx
    }

    pub async fn empty() -> Self {
        Self::with_db(setup_db().await)
    }

    pub fn with_db(db: Db) -> Self {
        let clock = Arc::new(FixedClock::new(noon()));
        let counters = Counters::default();
        let engine = ReservationEngine::new(
            db.clone(),
            clock.clone(),
            ReservationPolicy::default(),
            counters.clone(),
        );

        Self {
            db,
            clock,
            counters,
            engine,
        }
    }

    pub async fn stock(&self, batch_id: BatchId) -> i64 {
        sqlx::query("SELECT current_quantity FROM batches WHERE batch_id = ?;")
            .bind(batch_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("current_quantity")
    }

    pub async fn status(&self, cart_id: CartId) -> String {
        sqlx::query("SELECT status FROM carts WHERE cart_id = ?;")
            .bind(cart_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("status")
    }

    pub async fn reserved(&self, cart_id: CartId) -> bool {
        let v: i64 = sqlx::query("SELECT reserved FROM carts WHERE cart_id = ?;")
            .bind(cart_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("reserved");
        v == 1
    }

    pub async fn updated_at_ms(&self, cart_id: CartId) -> i64 {
        sqlx::query("SELECT updated_at_ms FROM carts WHERE cart_id = ?;")
            .bind(cart_id)
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("updated_at_ms")
    }

    pub async fn line_quantity(&self, cart_id: CartId, batch_id: BatchId) -> Option<i64> {
        sqlx::query("SELECT quantity FROM cart_lines WHERE cart_id = ? AND batch_id = ?;")
            .bind(cart_id)
            .bind(batch_id)
            .fetch_optional(self.db.pool())
            .await
            .unwrap()
            .map(|r| r.get("quantity"))
    }

    pub async fn cart_count(&self) -> i64 {
        sqlx::query("SELECT COUNT(*) AS n FROM carts;")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("n")
    }

    pub async fn open_cart_of(&self, buyer_id: BuyerId) -> Option<CartId> {
        sqlx::query("SELECT cart_id FROM carts WHERE buyer_id = ? AND status = 'OPENED';")
            .bind(buyer_id)
            .fetch_optional(self.db.pool())
            .await
            .unwrap()
            .map(|r| r.get("cart_id"))
    }

    pub async fn set_updated_at(&self, cart_id: CartId, at: NaiveDateTime) {
        sqlx::query("UPDATE carts SET updated_at_ms = ? WHERE cart_id = ?;")
            .bind(to_epoch_ms(at))
            .bind(cart_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    pub async fn set_line_quantity(&self, cart_id: CartId, batch_id: BatchId, quantity: i64) {
        sqlx::query("UPDATE cart_lines SET quantity = ? WHERE cart_id = ? AND batch_id = ?;")
            .bind(quantity)
            .bind(cart_id)
            .bind(batch_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    pub async fn set_price(&self, batch_id: BatchId, price: &str) {
        sqlx::query("UPDATE batches SET product_price = ? WHERE batch_id = ?;")
            .bind(price.to_string())
            .bind(batch_id)
            .execute(self.db.pool())
            .await
            .unwrap();
    }

    /// Σ current_quantity + Σ line quantities held by reserved carts.
    pub async fn accounted_units(&self) -> i64 {
        let on_hand: i64 = sqlx::query("SELECT COALESCE(SUM(current_quantity), 0) AS n FROM batches;")
            .fetch_one(self.db.pool())
            .await
            .unwrap()
            .get("n");

        let held: i64 = sqlx::query(
            r#"
SELECT COALESCE(SUM(l.quantity), 0) AS n
FROM cart_lines l JOIN carts c ON c.cart_id = l.cart_id
WHERE c.reserved = 1;
"#,
        )
        .fetch_one(self.db.pool())
        .await
        .unwrap()
        .get("n");

        on_hand + held
    }
}
