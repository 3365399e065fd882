use chrono::{NaiveDate, NaiveDateTime};
use sqlx::{Any, AnyConnection, Transaction};

/// Scope handle for one engine operation.
///
/// Every store read and write goes through the wrapped transaction, so an
/// operation either commits as a whole or, when the context is dropped
/// without `commit`, rolls back as a whole. The wall-clock instant is
/// captured once at `begin` and shared by every date decision inside the
/// scope.
pub struct TxContext {
    tx: Transaction<'static, Any>,
    now: NaiveDateTime,
}

impl TxContext {
    pub(super) fn new(tx: Transaction<'static, Any>, now: NaiveDateTime) -> Self {
        Self { tx, now }
    }

    pub fn conn(&mut self) -> &mut AnyConnection {
        &mut *self.tx
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        self.tx.rollback().await
    }
}

impl std::fmt::Debug for TxContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxContext").field("now", &self.now).finish()
    }
}
