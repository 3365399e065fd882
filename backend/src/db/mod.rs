pub(crate) mod convert;
pub mod schema;
mod tx;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::time::Clock;

pub use tx::TxContext;

const BEGIN_IMMEDIATE: &str = "BEGIN IMMEDIATE";

#[derive(Clone, Debug)]
pub struct Db {
    pool: AnyPool,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: AnyPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }

    /// Opens a transaction and pins `now` for everything that runs inside it.
    ///
    /// The write lock is taken up front. A deferred transaction that reads and
    /// then writes can deadlock against a peer doing the same, and SQLite
    /// answers that with BUSY immediately instead of waiting out the busy
    /// timeout.
    pub async fn begin(&self, clock: &dyn Clock) -> Result<TxContext, sqlx::Error> {
        let tx = self.pool.begin_with(BEGIN_IMMEDIATE).await?;
        Ok(TxContext::new(tx, clock.now()))
    }
}
