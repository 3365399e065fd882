use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::Row;
use sqlx::any::AnyRow;

use crate::buyer::BuyerId;
use crate::cart::model::{Cart, CartId, CartLine, CartStatus};
use crate::cart::repository::CartRepository;
use crate::db::TxContext;
use crate::db::convert::{format_date, i64_to_u32, parse_date, parse_money};
use crate::error::{EngineError, Entity};
use crate::inventory::BatchId;
use crate::time::{from_epoch_ms, to_epoch_ms};

const CART_COLUMNS: &str = "cart_id, buyer_id, created_date, updated_at_ms, status, reserved";

/// SQLx-backed implementation of CartRepository.
/// Responsible only for persistence and row mapping.
#[derive(Debug, Default, Clone)]
pub struct SqlxCartRepository;

impl SqlxCartRepository {
    pub fn new() -> Self {
        Self
    }

    async fn load_lines(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
    ) -> Result<Vec<CartLine>, EngineError> {
        let rows = sqlx::query(
            r#"
SELECT l.batch_id, l.position, l.quantity, l.unit_price, b.product_id, b.due_date
FROM cart_lines l
JOIN batches b ON b.batch_id = l.batch_id
WHERE l.cart_id = ?
ORDER BY l.position;
"#,
        )
        .bind(cart_id)
        .fetch_all(tx.conn())
        .await?;

        let mut lines = Vec::with_capacity(rows.len());
        for r in &rows {
            lines.push(row_to_line(r)?);
        }
        Ok(lines)
    }

    async fn hydrate(&self, tx: &mut TxContext, row: &AnyRow) -> Result<Cart, EngineError> {
        let mut cart = row_to_cart(row)?;
        cart.lines = self.load_lines(tx, cart.cart_id).await?;
        Ok(cart)
    }

    async fn fetch_one(
        &self,
        tx: &mut TxContext,
        sql: &str,
        binds: &[i64],
    ) -> Result<Option<Cart>, EngineError> {
        let mut q = sqlx::query(sql);
        for b in binds {
            q = q.bind(*b);
        }
        let row = q.fetch_optional(tx.conn()).await?;

        match row {
            Some(r) => Ok(Some(self.hydrate(tx, &r).await?)),
            None => Ok(None),
        }
    }

    async fn status_of(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
    ) -> Result<Option<CartStatus>, EngineError> {
        let row = sqlx::query("SELECT status FROM carts WHERE cart_id = ?;")
            .bind(cart_id)
            .fetch_optional(tx.conn())
            .await?;

        match row {
            Some(r) => {
                let raw: String = r.try_get("status")?;
                Ok(Some(raw.parse()?))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl CartRepository for SqlxCartRepository {
    async fn insert(&self, tx: &mut TxContext, buyer_id: BuyerId) -> Result<Cart, EngineError> {
        let created_date = tx.today();
        let now = tx.now();

        let row = sqlx::query(
            r#"
INSERT INTO carts (buyer_id, created_date, updated_at_ms, status, reserved)
VALUES (?, ?, ?, ?, 0)
RETURNING cart_id;
"#,
        )
        .bind(buyer_id)
        .bind(format_date(created_date))
        .bind(to_epoch_ms(now))
        .bind(CartStatus::Opened.to_string())
        .fetch_one(tx.conn())
        .await?;

        Ok(Cart {
            cart_id: row.try_get("cart_id")?,
            buyer_id,
            created_date,
            updated_at: now,
            status: CartStatus::Opened,
            reserved: false,
            lines: Vec::new(),
        })
    }

    async fn find_open_by_buyer(
        &self,
        tx: &mut TxContext,
        buyer_id: BuyerId,
    ) -> Result<Option<Cart>, EngineError> {
        let sql = format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE buyer_id = ? AND status = 'OPENED';"
        );
        self.fetch_one(tx, &sql, &[buyer_id]).await
    }

    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
    ) -> Result<Option<Cart>, EngineError> {
        let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE cart_id = ?;");
        self.fetch_one(tx, &sql, &[cart_id]).await
    }

    async fn find_by_id_and_buyer(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        buyer_id: BuyerId,
    ) -> Result<Option<Cart>, EngineError> {
        let sql = format!("SELECT {CART_COLUMNS} FROM carts WHERE cart_id = ? AND buyer_id = ?;");
        self.fetch_one(tx, &sql, &[cart_id, buyer_id]).await
    }

    async fn find_idle(
        &self,
        tx: &mut TxContext,
        status: CartStatus,
        updated_before: NaiveDateTime,
    ) -> Result<Vec<Cart>, EngineError> {
        let rows = sqlx::query(&format!(
            r#"
SELECT {CART_COLUMNS}
FROM carts
WHERE status = ? AND reserved = 1 AND updated_at_ms < ?
ORDER BY updated_at_ms, cart_id;
"#
        ))
        .bind(status.to_string())
        .bind(to_epoch_ms(updated_before))
        .fetch_all(tx.conn())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in &rows {
            match self.hydrate(tx, r).await {
                Ok(c) => out.push(c),
                Err(EngineError::Corrupt(e)) => {
                    tracing::warn!(error = %e, "skipping malformed cart row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn save(&self, tx: &mut TxContext, cart: &Cart) -> Result<(), EngineError> {
        let affected = sqlx::query(
            r#"
UPDATE carts
SET status = ?, reserved = ?, updated_at_ms = ?
WHERE cart_id = ? AND status = 'OPENED';
"#,
        )
        .bind(cart.status.to_string())
        .bind(i64::from(cart.reserved))
        .bind(to_epoch_ms(cart.updated_at))
        .bind(cart.cart_id)
        .execute(tx.conn())
        .await?
        .rows_affected();

        if affected == 0 {
            return match self.status_of(tx, cart.cart_id).await? {
                Some(_) => Err(EngineError::AlreadyClosed {
                    cart_id: cart.cart_id,
                }),
                None => Err(EngineError::not_found(Entity::Cart, cart.cart_id)),
            };
        }

        for line in &cart.lines {
            sqlx::query(
                r#"
INSERT INTO cart_lines (cart_id, batch_id, position, quantity, unit_price)
VALUES (?, ?, ?, ?, ?)
ON CONFLICT (cart_id, batch_id) DO UPDATE SET quantity = excluded.quantity;
"#,
            )
            .bind(cart.cart_id)
            .bind(line.batch_id)
            .bind(line.position)
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.to_string())
            .execute(tx.conn())
            .await?;
        }

        Ok(())
    }

    async fn delete_line(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        batch_id: BatchId,
    ) -> Result<(), EngineError> {
        let affected = sqlx::query("DELETE FROM cart_lines WHERE cart_id = ? AND batch_id = ?;")
            .bind(cart_id)
            .bind(batch_id)
            .execute(tx.conn())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(EngineError::not_found(
                Entity::CartLine,
                format!("{cart_id}/{batch_id}"),
            ));
        }
        Ok(())
    }

    async fn delete_lines(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        batch_ids: &[BatchId],
    ) -> Result<u64, EngineError> {
        if batch_ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; batch_ids.len()].join(", ");
        let sql =
            format!("DELETE FROM cart_lines WHERE cart_id = ? AND batch_id IN ({placeholders});");

        let mut q = sqlx::query(&sql).bind(cart_id);
        for id in batch_ids {
            q = q.bind(*id);
        }

        Ok(q.execute(tx.conn()).await?.rows_affected())
    }

    async fn release_if_idle(
        &self,
        tx: &mut TxContext,
        cart_id: CartId,
        updated_before: NaiveDateTime,
    ) -> Result<bool, EngineError> {
        let affected = sqlx::query(
            r#"
UPDATE carts
SET reserved = 0
WHERE cart_id = ? AND status = 'OPENED' AND reserved = 1 AND updated_at_ms < ?;
"#,
        )
        .bind(cart_id)
        .bind(to_epoch_ms(updated_before))
        .execute(tx.conn())
        .await?
        .rows_affected();

        Ok(affected == 1)
    }
}

/* =========================
Row mapping
========================= */

fn row_to_cart(r: &AnyRow) -> anyhow::Result<Cart> {
    let created: String = r.try_get("created_date")?;
    let updated_ms: i64 = r.try_get("updated_at_ms")?;
    let status: String = r.try_get("status")?;
    let reserved: i64 = r.try_get("reserved")?;

    Ok(Cart {
        cart_id: r.try_get("cart_id")?,
        buyer_id: r.try_get("buyer_id")?,
        created_date: parse_date(&created)?,
        updated_at: from_epoch_ms(updated_ms)
            .ok_or_else(|| anyhow!("updated_at_ms out of range: {updated_ms}"))?,
        status: status.parse()?,
        reserved: reserved == 1,
        lines: Vec::new(),
    })
}

fn row_to_line(r: &AnyRow) -> anyhow::Result<CartLine> {
    let price: String = r.try_get("unit_price")?;
    let due: String = r.try_get("due_date")?;

    Ok(CartLine {
        batch_id: r.try_get("batch_id")?,
        quantity: i64_to_u32(r.try_get("quantity")?)?,
        unit_price: parse_money(&price).context("unit_price")?,
        position: r.try_get("position")?,
        product_id: r.try_get("product_id")?,
        due_date: parse_date(&due)?,
    })
}
