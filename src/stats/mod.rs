use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// 引擎写路径计数器（无锁，Relaxed 即可）
#[derive(Debug, Default)]
pub struct IndexStats {
    buckets_written: AtomicU64,
    buckets_cleared: AtomicU64,
    cache_invalidations: AtomicU64,
    reverse_writes: AtomicU64,
    items_recomputed: AtomicU64,
    filter_rebuilds: AtomicU64,
    filter_rebuilds_skipped: AtomicU64,
}

impl IndexStats {
    pub(crate) fn record_buckets(&self, written: usize, cleared: usize) {
        self.buckets_written.fetch_add(written as u64, Ordering::Relaxed);
        self.buckets_cleared.fetch_add(cleared as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_invalidation(&self) {
        self.cache_invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reverse_write(&self) {
        self.reverse_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_recompute(&self) {
        self.items_recomputed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_filter_change(&self, rebuilt: bool) {
        if rebuilt {
            self.filter_rebuilds.fetch_add(1, Ordering::Relaxed);
        } else {
            self.filter_rebuilds_skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn report(&self) -> IndexReport {
        IndexReport {
            buckets_written: self.buckets_written.load(Ordering::Relaxed),
            buckets_cleared: self.buckets_cleared.load(Ordering::Relaxed),
            cache_invalidations: self.cache_invalidations.load(Ordering::Relaxed),
            reverse_writes: self.reverse_writes.load(Ordering::Relaxed),
            items_recomputed: self.items_recomputed.load(Ordering::Relaxed),
            filter_rebuilds: self.filter_rebuilds.load(Ordering::Relaxed),
            filter_rebuilds_skipped: self.filter_rebuilds_skipped.load(Ordering::Relaxed),
        }
    }
}

/// 某一时刻的计数快照
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub buckets_written: u64,
    pub buckets_cleared: u64,
    pub cache_invalidations: u64,
    pub reverse_writes: u64,
    pub items_recomputed: u64,
    pub filter_rebuilds: u64,
    pub filter_rebuilds_skipped: u64,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════╗")?;
        writeln!(f, "║        filter-index Write Report         ║")?;
        writeln!(f, "╠══════════════════════════════════════════╣")?;
        writeln!(f, "║ buckets written:     {:>18}  ║", self.buckets_written)?;
        writeln!(f, "║ buckets cleared:     {:>18}  ║", self.buckets_cleared)?;
        writeln!(f, "║ cache invalidations: {:>18}  ║", self.cache_invalidations)?;
        writeln!(f, "║ reverse writes:      {:>18}  ║", self.reverse_writes)?;
        writeln!(f, "║ items recomputed:    {:>18}  ║", self.items_recomputed)?;
        writeln!(f, "╠──────────────────────────────────────────╣")?;
        writeln!(f, "║ filter rebuilds:     {:>18}  ║", self.filter_rebuilds)?;
        writeln!(f, "║ rebuilds skipped:    {:>18}  ║", self.filter_rebuilds_skipped)?;
        writeln!(f, "╚══════════════════════════════════════════╝")?;
        Ok(())
    }
}
