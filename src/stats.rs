//! Ambient run statistics for the `--stats` flag.
//!
//! A small set of atomic counters and timers, in the spirit of the original
//! tool's thread-locked `Stats` dataclass, adapted to `std::sync::atomic`
//! since this crate is single-threaded apart from the background worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Default)]
pub struct Stats {
    pub files_indexed: AtomicU64,
    pub files_skipped: AtomicU64,
    pub files_deleted: AtomicU64,
    pub objects_inserted: AtomicU64,
    pub embedding_requests: AtomicU64,
    pub embedding_batches: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_misses: AtomicU64,
    index_duration_ns: AtomicU64,
    search_duration_ns: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn record_index_duration(&self, d: Duration) {
        self.index_duration_ns.fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_search_duration(&self, d: Duration) {
        self.search_duration_ns.fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn add_files_indexed(&self, n: u64) {
        self.files_indexed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_files_skipped(&self, n: u64) {
        self.files_skipped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_files_deleted(&self, n: u64) {
        self.files_deleted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_objects_inserted(&self, n: u64) {
        self.objects_inserted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_embedding_requests(&self, n: u64) {
        self.embedding_requests.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_embedding_batches(&self, n: u64) {
        self.embedding_batches.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            files_indexed: self.files_indexed.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            files_deleted: self.files_deleted.load(Ordering::Relaxed),
            objects_inserted: self.objects_inserted.load(Ordering::Relaxed),
            embedding_requests: self.embedding_requests.load(Ordering::Relaxed),
            embedding_batches: self.embedding_batches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            index_duration: Duration::from_nanos(self.index_duration_ns.load(Ordering::Relaxed)),
            search_duration: Duration::from_nanos(self.search_duration_ns.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub files_deleted: u64,
    pub objects_inserted: u64,
    pub embedding_requests: u64,
    pub embedding_batches: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub index_duration: Duration,
    pub search_duration: Duration,
}

/// RAII timer: records elapsed time into the given counter on drop.
pub struct Timer<'a> {
    start: Instant,
    record: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> Timer<'a> {
    pub fn new(record: impl Fn(Duration) + 'a) -> Self {
        Timer { start: Instant::now(), record: Box::new(record) }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        (self.record)(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_records_elapsed_duration_on_drop() {
        let stats = Stats::new();
        {
            let _t = Timer::new(|d| stats.record_index_duration(d));
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(stats.snapshot().index_duration.as_nanos() > 0);
    }
}
