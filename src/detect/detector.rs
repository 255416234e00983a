//! Edge detection over bin snapshots.
//!
//! The detector fires on the transition into `FULL`, not on the level: a bin
//! that stays full across many snapshots yields one event, and a bin that is
//! reset and fills again yields another.

use std::collections::HashMap;

use crate::dustbin::{BinId, BinSnapshot, BinStatus};

use super::events::BinFull;

/// Last observed status per bin.
///
/// Process-lifetime only. After a restart the cache is empty, so every bin
/// that is already full fires once on the first snapshot unless the cache
/// is seeded.
#[derive(Debug, Default, Clone)]
pub struct StatusCache {
    last: HashMap<BinId, BinStatus>,
}

impl StatusCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last status seen for `bin`.
    #[must_use]
    pub fn get(&self, bin: &BinId) -> Option<BinStatus> {
        self.last.get(bin).copied()
    }

    /// Stores `status` and returns the previous value.
    pub fn record(&mut self, bin: BinId, status: BinStatus) -> Option<BinStatus> {
        self.last.insert(bin, status)
    }

    /// Number of bins seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Emits [`BinFull`] once per transition into `FULL`.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    cache: StatusCache,
    full_threshold: u8,
}

impl ChangeDetector {
    /// Creates a detector with an empty cache. `full_threshold` is only used
    /// to flag suspicious sensor reports.
    #[must_use]
    pub fn new(full_threshold: u8) -> Self {
        Self {
            cache: StatusCache::new(),
            full_threshold,
        }
    }

    /// Processes one snapshot, returning events in bin-key order.
    ///
    /// Bins absent from the snapshot keep their cached status.
    pub fn observe(&mut self, snapshot: &BinSnapshot) -> Vec<BinFull> {
        let mut events = Vec::new();
        for bin in snapshot.iter() {
            let previous = self.cache.record(bin.id.clone(), bin.status);
            if !bin.status.is_full() || previous == Some(BinStatus::Full) {
                continue;
            }

            if bin.sensor_inconsistent(self.full_threshold) {
                tracing::warn!(
                    bin_id = %bin.id,
                    fill_level = bin.fill_level,
                    threshold = self.full_threshold,
                    "bin reports FULL below threshold"
                );
            }
            tracing::debug!(bin_id = %bin.id, fill_level = bin.fill_level, "bin became full");
            events.push(BinFull::from_bin(bin));
        }
        events
    }

    /// Records every bin's status without emitting events.
    pub fn seed(&mut self, snapshot: &BinSnapshot) {
        for bin in snapshot.iter() {
            self.cache.record(bin.id.clone(), bin.status);
        }
        tracing::info!(bins = snapshot.len(), "status cache seeded");
    }

    /// Read access to the cache.
    #[must_use]
    pub fn cache(&self) -> &StatusCache {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dustbin::Bin;

    fn snap(entries: &[(&str, BinStatus)]) -> BinSnapshot {
        BinSnapshot::from_bins(entries.iter().map(|(id, status)| {
            let fill = if status.is_full() { 95 } else { 20 };
            Bin::new(BinId::new(*id).unwrap(), fill, *status).unwrap()
        }))
    }

    #[test]
    fn fires_once_per_run_of_full() {
        use BinStatus::{Full, Normal};
        let mut detector = ChangeDetector::new(90);
        let sequence = [Normal, Normal, Full, Full, Normal, Full];

        let fired: Vec<usize> = sequence
            .iter()
            .enumerate()
            .filter(|(_, s)| !detector.observe(&snap(&[("B1", **s)])).is_empty())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(fired, vec![2, 5]);
    }

    #[test]
    fn first_sight_full_fires_but_seeded_does_not() {
        let first = snap(&[("a", BinStatus::Full), ("b", BinStatus::Normal)]);

        let mut cold = ChangeDetector::new(90);
        let events = cold.observe(&first);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].bin_id.as_str(), "a");
        assert_eq!(events[0].fill_level, 95);

        let mut warm = ChangeDetector::new(90);
        warm.seed(&first);
        assert!(warm.observe(&first).is_empty());
    }

    #[test]
    fn absent_bins_keep_cached_status() {
        let mut detector = ChangeDetector::new(90);
        detector.observe(&snap(&[("a", BinStatus::Full)]));
        detector.observe(&snap(&[("b", BinStatus::Normal)]));
        assert_eq!(detector.cache().get(&BinId::new("a").unwrap()), Some(BinStatus::Full));

        // Still full when it reappears: no second event.
        assert!(detector.observe(&snap(&[("a", BinStatus::Full)])).is_empty());
    }

    #[test]
    fn unknown_status_is_not_full() {
        let mut detector = ChangeDetector::new(90);
        detector.observe(&snap(&[("a", BinStatus::Full)]));
        detector.observe(&snap(&[("a", BinStatus::Unknown)]));
        assert_eq!(detector.observe(&snap(&[("a", BinStatus::Full)])).len(), 1);
    }
}
