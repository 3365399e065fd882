//! Reservation engine: the transactional core that moves stock between
//! batches and carts.
//!
//! Every public operation opens one `TxContext`, performs its whole
//! read-modify-write sequence through the stores, and commits. Any error
//! drops the context and rolls the operation back. Transient store
//! conflicts rerun the operation from scratch a bounded number of times.

mod engine;
mod retry;
pub mod types;

pub use engine::ReservationEngine;
pub use types::{LineRequest, ReclaimReport, ReservationPolicy};
