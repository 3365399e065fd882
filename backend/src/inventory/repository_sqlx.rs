use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use sqlx::any::AnyRow;

use crate::db::TxContext;
use crate::db::convert::{format_date, i64_to_u32, parse_date, parse_money};
use crate::error::{EngineError, Entity};
use crate::inventory::model::{Batch, BatchId, NewBatch};
use crate::inventory::repository::InventoryRepository;

const BATCH_COLUMNS: &str = "batch_id, product_id, section_id, product_price, \
                             initial_quantity, current_quantity, due_date";

/// SQLx-backed implementation of InventoryRepository.
/// Responsible only for persistence and row mapping.
#[derive(Debug, Default, Clone)]
pub struct SqlxInventoryRepository;

impl SqlxInventoryRepository {
    pub fn new() -> Self {
        Self
    }

    async fn exists(&self, tx: &mut TxContext, batch_id: BatchId) -> Result<bool, EngineError> {
        let row = sqlx::query("SELECT 1 AS present FROM batches WHERE batch_id = ?;")
            .bind(batch_id)
            .fetch_optional(tx.conn())
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl InventoryRepository for SqlxInventoryRepository {
    async fn ingest(&self, tx: &mut TxContext, batch: &NewBatch) -> Result<Batch, EngineError> {
        sqlx::query(
            r#"
INSERT INTO batches (
  batch_id, product_id, section_id, product_price,
  initial_quantity, current_quantity, due_date
)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(batch.batch_id)
        .bind(batch.product_id)
        .bind(batch.section_id)
        .bind(batch.product_price.to_string())
        .bind(i64::from(batch.initial_quantity))
        .bind(i64::from(batch.initial_quantity))
        .bind(format_date(batch.due_date))
        .execute(tx.conn())
        .await?;

        Ok(Batch {
            batch_id: batch.batch_id,
            product_id: batch.product_id,
            section_id: batch.section_id,
            product_price: batch.product_price,
            initial_quantity: batch.initial_quantity,
            current_quantity: batch.initial_quantity,
            due_date: batch.due_date,
        })
    }

    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
    ) -> Result<Batch, EngineError> {
        let row = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM batches WHERE batch_id = ?;"
        ))
        .bind(batch_id)
        .fetch_optional(tx.conn())
        .await?;

        match row {
            Some(r) => Ok(row_to_batch(&r)?),
            None => Err(EngineError::not_found(Entity::Batch, batch_id)),
        }
    }

    async fn find_available(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
        horizon: NaiveDate,
    ) -> Result<Option<Batch>, EngineError> {
        // One read answers both "does it exist" and "is it available".
        let row = sqlx::query(&format!(
            r#"
SELECT {BATCH_COLUMNS},
  CASE WHEN current_quantity >= ? AND due_date > ? THEN 1 ELSE 0 END AS available
FROM batches
WHERE batch_id = ?;
"#
        ))
        .bind(i64::from(quantity))
        .bind(format_date(horizon))
        .bind(batch_id)
        .fetch_optional(tx.conn())
        .await?;

        let Some(r) = row else {
            return Err(EngineError::not_found(Entity::Batch, batch_id));
        };

        let available: i64 = r.try_get("available")?;
        if available == 1 {
            Ok(Some(row_to_batch(&r)?))
        } else {
            Ok(None)
        }
    }

    async fn list_available(
        &self,
        tx: &mut TxContext,
        horizon: NaiveDate,
    ) -> Result<Vec<Batch>, EngineError> {
        let rows = sqlx::query(&format!(
            r#"
SELECT {BATCH_COLUMNS}
FROM batches
WHERE current_quantity > 0 AND due_date > ?
ORDER BY due_date, batch_id;
"#
        ))
        .bind(format_date(horizon))
        .fetch_all(tx.conn())
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_batch(&r) {
                Ok(b) => out.push(b),
                Err(e) => {
                    // poison-row resilience: a bad row must not hide the rest of the catalogue
                    tracing::warn!(error = %e, "skipping malformed batch row");
                }
            }
        }

        Ok(out)
    }

    async fn debit(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
    ) -> Result<(), EngineError> {
        let affected = sqlx::query(
            r#"
UPDATE batches
SET current_quantity = current_quantity - ?
WHERE batch_id = ? AND current_quantity >= ?;
"#,
        )
        .bind(i64::from(quantity))
        .bind(batch_id)
        .bind(i64::from(quantity))
        .execute(tx.conn())
        .await?
        .rows_affected();

        if affected == 1 {
            return Ok(());
        }

        if self.exists(tx, batch_id).await? {
            Err(EngineError::BatchOutOfStock { batch_id })
        } else {
            Err(EngineError::not_found(Entity::Batch, batch_id))
        }
    }

    async fn credit(
        &self,
        tx: &mut TxContext,
        batch_id: BatchId,
        quantity: u32,
    ) -> Result<(), EngineError> {
        let affected = sqlx::query(
            r#"
UPDATE batches
SET current_quantity = current_quantity + ?
WHERE batch_id = ?;
"#,
        )
        .bind(i64::from(quantity))
        .bind(batch_id)
        .execute(tx.conn())
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(EngineError::not_found(Entity::Batch, batch_id));
        }
        Ok(())
    }
}

/* =========================
Row mapping
========================= */

fn row_to_batch(r: &AnyRow) -> anyhow::Result<Batch> {
    let price: String = r.try_get("product_price")?;
    let due: String = r.try_get("due_date")?;

    Ok(Batch {
        batch_id: r.try_get("batch_id")?,
        product_id: r.try_get("product_id")?,
        section_id: r.try_get("section_id")?,
        product_price: parse_money(&price).context("product_price")?,
        initial_quantity: i64_to_u32(r.try_get("initial_quantity")?)?,
        current_quantity: i64_to_u32(r.try_get("current_quantity")?)?,
        due_date: parse_date(&due)?,
    })
}
