pub mod model;
pub mod repository;
pub mod repository_sqlx;

pub use model::{Batch, BatchId, NewBatch, freshness_horizon};
pub use repository::InventoryRepository;
pub use repository_sqlx::SqlxInventoryRepository;
