//! Local store metrics

use metrics::{Counter, Gauge};

use crate::ModeSet;

/// Local store metrics
#[derive(Clone, Debug)]
pub(crate) struct LocalStoreMetrics {
    /// Number of committed access transitions
    pub(crate) access_total: Counter,
    /// Number of committed sync transitions
    pub(crate) sync_total: Counter,
    /// Number of committed remove transitions
    pub(crate) remove_total: Counter,
    /// Number of failed transitions
    pub(crate) errors_total: Counter,
    /// Entries in the GC index
    pub(crate) gc_size: Gauge,
}

impl Default for LocalStoreMetrics {
    fn default() -> Self {
        Self {
            access_total: metrics::counter!("localstore.mode_set.access_total"),
            sync_total: metrics::counter!("localstore.mode_set.sync_total"),
            remove_total: metrics::counter!("localstore.mode_set.remove_total"),
            errors_total: metrics::counter!("localstore.mode_set.errors_total"),
            gc_size: metrics::gauge!("localstore.gc_size"),
        }
    }
}

impl LocalStoreMetrics {
    /// Record a committed transition and the resulting GC size.
    pub(crate) fn record_committed(&self, mode: ModeSet, gc_size: u64) {
        match mode {
            ModeSet::Access => self.access_total.increment(1),
            ModeSet::Sync => self.sync_total.increment(1),
            ModeSet::Remove => self.remove_total.increment(1),
        }
        self.gc_size.set(gc_size as f64);
    }

    /// Increments the counter for failed transitions.
    pub(crate) fn inc_errors(&self) {
        self.errors_total.increment(1);
    }
}
