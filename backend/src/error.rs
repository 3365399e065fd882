use thiserror::Error;

/// Entities the engine can fail to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Buyer,
    Batch,
    Cart,
    PurchaseOrder,
    CartLine,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Entity::Buyer => "Buyer",
            Entity::Batch => "Batch",
            Entity::Cart => "Cart",
            Entity::PurchaseOrder => "PurchaseOrder",
            Entity::CartLine => "CartLine",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: Entity, id: String },

    #[error("buyer {buyer_id} does not own cart {cart_id}")]
    UnauthorizedBuyer { buyer_id: i64, cart_id: i64 },

    #[error("cart {cart_id} is already closed")]
    AlreadyClosed { cart_id: i64 },

    #[error("batch {batch_id} cannot satisfy the requested quantity")]
    BatchOutOfStock { batch_id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Store-level conflict; the whole operation may be retried.
    #[error("transient store conflict: {0}")]
    Transient(#[source] sqlx::Error),

    #[error("{operation} gave up after {attempts} attempts")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        last: sqlx::Error,
    },

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A persisted row could not be mapped back into the domain.
    #[error("corrupt row: {0:#}")]
    Corrupt(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient(&e) {
            Self::Transient(e)
        } else {
            Self::Database(e)
        }
    }
}

/// SQLite BUSY / LOCKED (incl. extended codes) and Postgres serialization
/// failures / deadlocks.
const TRANSIENT_CODES: &[&str] = &["5", "6", "262", "517", "40001", "40P01"];

/// Partial unique index allowing one OPENED cart per buyer. Two first-adds
/// racing to open a cart collide here; the loser retries and finds the
/// winner's cart. Any other unique violation is a genuine duplicate.
pub(crate) const OPEN_CART_INDEX: &str = "idx_carts_open_buyer";

fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return is_open_cart_collision(db.constraint(), db.message());
            }
            db.code()
                .is_some_and(|c| TRANSIENT_CODES.contains(&c.as_ref()))
        }
        _ => false,
    }
}

// SQLite reports the indexed column rather than the index name.
fn is_open_cart_collision(constraint: Option<&str>, message: &str) -> bool {
    constraint == Some(OPEN_CART_INDEX)
        || message.contains(OPEN_CART_INDEX)
        || message.contains("carts.buyer_id")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_transient() {
        let e = EngineError::from(sqlx::Error::PoolTimedOut);
        assert!(e.is_transient());
    }

    #[test]
    fn row_not_found_is_not_transient() {
        let e = EngineError::from(sqlx::Error::RowNotFound);
        assert!(matches!(e, EngineError::Database(_)));
    }

    #[test]
    fn not_found_message_names_entity() {
        let e = EngineError::not_found(Entity::PurchaseOrder, 7);
        assert_eq!(e.to_string(), "PurchaseOrder not found: 7");
    }

    #[test]
    fn only_the_open_cart_index_collision_is_retryable() {
        assert!(is_open_cart_collision(
            None,
            "UNIQUE constraint failed: carts.buyer_id"
        ));
        assert!(is_open_cart_collision(Some(OPEN_CART_INDEX), "duplicate key"));

        assert!(!is_open_cart_collision(
            None,
            "UNIQUE constraint failed: batches.batch_id"
        ));
        assert!(!is_open_cart_collision(
            None,
            "UNIQUE constraint failed: buyers.buyer_id"
        ));
    }
}
