//! Loader statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of a loader's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Windows created.
    pub windows_opened: u64,
    /// Windows that resolved with an error.
    pub windows_failed: u64,
    /// Keys passed to `load`/`load_many`, duplicates included.
    pub keys_requested: u64,
    /// Distinct keys handed to the fetch operation.
    pub keys_dispatched: u64,
    /// Fetch operation invocations (one per chunk).
    pub fetch_calls: u64,
    /// Windows whose failure came from the fetch operation.
    pub fetch_failures: u64,
}

impl LoaderStats {
    /// Fraction of requested keys that never reached the fetch operation.
    pub fn dedup_ratio(&self) -> f64 {
        if self.keys_requested == 0 {
            0.0
        } else {
            1.0 - (self.keys_dispatched as f64 / self.keys_requested as f64)
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct AtomicStats {
    pub windows_opened: AtomicU64,
    pub windows_failed: AtomicU64,
    pub keys_requested: AtomicU64,
    pub keys_dispatched: AtomicU64,
    pub fetch_calls: AtomicU64,
    pub fetch_failures: AtomicU64,
}

impl AtomicStats {
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn to_stats(&self) -> LoaderStats {
        LoaderStats {
            windows_opened: self.windows_opened.load(Ordering::Relaxed),
            windows_failed: self.windows_failed.load(Ordering::Relaxed),
            keys_requested: self.keys_requested.load(Ordering::Relaxed),
            keys_dispatched: self.keys_dispatched.load(Ordering::Relaxed),
            fetch_calls: self.fetch_calls.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_ratio() {
        let stats = LoaderStats {
            keys_requested: 10,
            keys_dispatched: 4,
            ..Default::default()
        };
        assert!((stats.dedup_ratio() - 0.6).abs() < 1e-9);
        assert_eq!(LoaderStats::default().dedup_ratio(), 0.0);
    }

    #[test]
    fn test_atomic_stats_snapshot() {
        let stats = AtomicStats::default();
        AtomicStats::add(&stats.windows_opened, 1);
        AtomicStats::add(&stats.keys_requested, 5);
        AtomicStats::add(&stats.keys_requested, 3);
        let snap = stats.to_stats();
        assert_eq!(snap.windows_opened, 1);
        assert_eq!(snap.keys_requested, 8);
        assert_eq!(snap.fetch_calls, 0);
    }
}
