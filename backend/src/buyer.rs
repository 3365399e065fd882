//! Buyer directory. Identity lives outside the engine; carts only need to know
//! that the principal they are opened for exists.

use async_trait::async_trait;

use crate::db::TxContext;
use crate::error::EngineError;

pub type BuyerId = i64;

#[async_trait]
pub trait BuyerRepository: Send + Sync {
    async fn exists(&self, tx: &mut TxContext, buyer_id: BuyerId) -> Result<bool, EngineError>;

    async fn register(
        &self,
        tx: &mut TxContext,
        buyer_id: BuyerId,
        name: &str,
    ) -> Result<(), EngineError>;
}

#[derive(Debug, Default, Clone)]
pub struct SqlxBuyerRepository;

impl SqlxBuyerRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BuyerRepository for SqlxBuyerRepository {
    async fn exists(&self, tx: &mut TxContext, buyer_id: BuyerId) -> Result<bool, EngineError> {
        let row = sqlx::query("SELECT 1 AS present FROM buyers WHERE buyer_id = ?;")
            .bind(buyer_id)
            .fetch_optional(tx.conn())
            .await?;
        Ok(row.is_some())
    }

    async fn register(
        &self,
        tx: &mut TxContext,
        buyer_id: BuyerId,
        name: &str,
    ) -> Result<(), EngineError> {
        sqlx::query("INSERT INTO buyers (buyer_id, name) VALUES (?, ?);")
            .bind(buyer_id)
            .bind(name)
            .execute(tx.conn())
            .await?;
        Ok(())
    }
}
