/// Counters describing what a [`crate::QueryCache`] has done since it was
/// created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Reads answered from the cache.
    pub hit: usize,
    /// Reads that found nothing usable.
    pub miss: usize,
    /// Query results written.
    pub stored: usize,
    /// Query results refused because they touch a blacklisted table.
    pub blacklisted: usize,
    /// Entries purged by table invalidation.
    pub invalidate: usize,
    /// Entries purged because their table index was full.
    pub evicted: usize,
}

impl CacheStatistics {
    /// Fraction of reads that were hits, `0.0` when nothing was read yet.
    pub fn hit_ratio(&self) -> f64 {
        let reads = self.hit + self.miss;
        if reads == 0 {
            0.0
        } else {
            self.hit as f64 / reads as f64
        }
    }
}
