//! ABOUTME: Prometheus counters for the query cache
//! ABOUTME: Shared by clones of the file cache and registered by the obs server

use prometheus_client::metrics::counter::Counter;
use prometheus_client::registry::Registry;

/// Counters for cache lookups and writes
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    /// Lookups answered from memory or disk
    pub hits: Counter,
    /// Lookups that found nothing usable
    pub misses: Counter,
    /// Entries written to disk
    pub writes: Counter,
    /// Entries removed by delete, clear or the sweeper
    pub invalidations: Counter,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.inc();
    }

    pub fn record_miss(&self) {
        self.misses.inc();
    }

    pub fn record_write(&self) {
        self.writes.inc();
    }

    pub fn record_invalidations(&self, count: usize) {
        self.invalidations.inc_by(count as u64);
    }

    /// Attach the counters to a registry under the `cache_` prefix
    pub fn register(&self, registry: &mut Registry) {
        registry.register("cache_hits", "Cache lookups served", self.hits.clone());
        registry.register(
            "cache_misses",
            "Cache lookups that missed",
            self.misses.clone(),
        );
        registry.register("cache_writes", "Cache entries written", self.writes.clone());
        registry.register(
            "cache_invalidations",
            "Cache entries removed",
            self.invalidations.clone(),
        );
    }
}
