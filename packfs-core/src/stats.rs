//! Lookup statistics for a VFS instance.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::SourceKind;

/// Counters updated by the resolution chain.
#[derive(Debug, Default)]
pub struct VfsStats {
    /// Lookups that walked the resolution chain
    pub lookups: AtomicU64,

    /// Lookups that no layer answered
    pub misses: AtomicU64,

    /// Hits per layer, indexed in precedence order
    hits: [AtomicU64; 4],

    /// Directory listings served
    pub listings: AtomicU64,

    /// Bytes returned by whole-file and partial loads
    pub bytes_loaded: AtomicU64,

    /// Number of active mounts across all registries
    pub mount_count: AtomicU64,
}

fn slot(kind: SourceKind) -> usize {
    match kind {
        SourceKind::RealDirectory => 0,
        SourceKind::Overlay => 1,
        SourceKind::ZipMount => 2,
        SourceKind::SequentialArchiveMount => 3,
    }
}

impl VfsStats {
    /// Creates a new VfsStats instance with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the start of a lookup.
    pub fn record_lookup(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    /// Records which layer answered a lookup.
    pub fn record_hit(&self, kind: SourceKind) {
        self.hits[slot(kind)].fetch_add(1, Ordering::Relaxed);
    }

    /// Records a lookup nobody answered.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a directory listing.
    pub fn record_listing(&self) {
        self.listings.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the loaded bytes counter.
    pub fn add_bytes_loaded(&self, bytes: u64) {
        self.bytes_loaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Increments the mount count.
    pub fn increment_mounts(&self) {
        self.mount_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Subtracts from the mount count without going below zero.
    pub fn remove_mounts(&self, count: u64) {
        let _ = self
            .mount_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(count))
            });
    }

    /// Gets the hit count for one layer.
    pub fn hits(&self, kind: SourceKind) -> u64 {
        self.hits[slot(kind)].load(Ordering::Relaxed)
    }

    /// Returns the hit rate as a percentage (0.0 to 100.0).
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);

        if lookups == 0 {
            0.0
        } else {
            (lookups.saturating_sub(misses) as f64 / lookups as f64) * 100.0
        }
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            hits: SourceKind::ALL.map(|kind| (kind, self.hits(kind))),
            listings: self.listings.load(Ordering::Relaxed),
            bytes_loaded: self.bytes_loaded.load(Ordering::Relaxed),
            mount_count: self.mount_count.load(Ordering::Relaxed),
        }
    }

    /// Resets all statistics to zero.
    pub fn reset(&self) {
        self.lookups.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.listings.store(0, Ordering::Relaxed);
        self.bytes_loaded.store(0, Ordering::Relaxed);
        self.mount_count.store(0, Ordering::Relaxed);
        for counter in &self.hits {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// A point-in-time copy of [`VfsStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub misses: u64,
    pub hits: [(SourceKind, u64); 4],
    pub listings: u64,
    pub bytes_loaded: u64,
    pub mount_count: u64,
}

impl StatsSnapshot {
    /// Hits for one layer.
    pub fn hits_for(&self, kind: SourceKind) -> u64 {
        self.hits
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lookups: {} (misses: {})", self.lookups, self.misses)?;
        for (kind, count) in &self.hits {
            write!(f, ", {}: {}", kind, count)?;
        }
        write!(
            f,
            ", listings: {}, bytes loaded: {}, mounts: {}",
            self.listings, self.bytes_loaded, self.mount_count
        )
    }
}
