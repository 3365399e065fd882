use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility.
#[derive(Clone, Default, Debug)]
pub struct Counters {
    pub carts_opened: Arc<AtomicU64>,
    pub carts_closed: Arc<AtomicU64>,

    pub lines_reserved: Arc<AtomicU64>,
    pub lines_removed: Arc<AtomicU64>,
    // lines dropped by the re-reservation pass
    pub lines_pruned: Arc<AtomicU64>,
    pub out_of_stock: Arc<AtomicU64>,

    pub carts_reclaimed: Arc<AtomicU64>,
    pub units_reclaimed: Arc<AtomicU64>,

    pub tx_retries: Arc<AtomicU64>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub carts_opened: u64,
    pub carts_closed: u64,
    pub lines_reserved: u64,
    pub lines_removed: u64,
    pub lines_pruned: u64,
    pub out_of_stock: u64,
    pub carts_reclaimed: u64,
    pub units_reclaimed: u64,
    pub tx_retries: u64,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CountersSnapshot {
            carts_opened: get(&self.carts_opened),
            carts_closed: get(&self.carts_closed),
            lines_reserved: get(&self.lines_reserved),
            lines_removed: get(&self.lines_removed),
            lines_pruned: get(&self.lines_pruned),
            out_of_stock: get(&self.out_of_stock),
            carts_reclaimed: get(&self.carts_reclaimed),
            units_reclaimed: get(&self.units_reclaimed),
            tx_retries: get(&self.tx_retries),
        }
    }
}

/// Increments gathered by one transaction attempt. Applied to the shared
/// counters only once the attempt commits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub carts_opened: u64,
    pub carts_closed: u64,
    pub lines_reserved: u64,
    pub lines_removed: u64,
    pub lines_pruned: u64,
}

impl Tally {
    pub fn apply(&self, counters: &Counters) {
        Counters::add(&counters.carts_opened, self.carts_opened);
        Counters::add(&counters.carts_closed, self.carts_closed);
        Counters::add(&counters.lines_reserved, self.lines_reserved);
        Counters::add(&counters.lines_removed, self.lines_removed);
        Counters::add(&counters.lines_pruned, self.lines_pruned);
    }
}
