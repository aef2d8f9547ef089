//! Sparse per-minute count series.
//!
//! Every entity (and every cluster center) is a [`SparseTimeSeries`]: an ordered map
//! from timestamp to occurrence count. Only non-zero counts are stored, so a series
//! that is silent for a month costs nothing for that month.

use std::collections::btree_map;
use std::collections::BTreeMap;

use chrono::NaiveDateTime;

use crate::error::{Error, Result};

/// Timestamps are naive wall-clock minutes, as recorded by the workload trace.
pub type Timestamp = NaiveDateTime;

/// Ordered mapping from timestamp to occurrence count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SparseTimeSeries {
    points: BTreeMap<Timestamp, u64>,
}

impl SparseTimeSeries {
    /// Create an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` occurrences at `at`.
    ///
    /// Zero counts are not stored.
    pub fn record(&mut self, at: Timestamp, count: u64) {
        if count == 0 {
            return;
        }
        *self.points.entry(at).or_insert(0) += count;
    }

    /// Count at `at` (0 if absent).
    #[inline]
    pub fn get(&self, at: &Timestamp) -> u64 {
        self.points.get(at).copied().unwrap_or(0)
    }

    /// Number of stored (non-zero) points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True if nothing was ever recorded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Earliest recorded timestamp.
    pub fn first(&self) -> Option<Timestamp> {
        self.points.keys().next().copied()
    }

    /// Latest recorded timestamp.
    pub fn last(&self) -> Option<Timestamp> {
        self.points.keys().next_back().copied()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.points.values().sum()
    }

    /// Iterate all points in timestamp order.
    pub fn iter(&self) -> btree_map::Iter<'_, Timestamp, u64> {
        self.points.iter()
    }

    /// Points with timestamp in `[lo, hi)`.
    pub fn range(&self, lo: Timestamp, hi: Timestamp) -> impl Iterator<Item = (&Timestamp, &u64)> {
        // BTreeMap::range panics on an inverted range.
        let hi = hi.max(lo);
        self.points.range(lo..hi)
    }

    /// Sum of counts in `[lo, hi)`.
    pub fn range_total(&self, lo: Timestamp, hi: Timestamp) -> u64 {
        self.range(lo, hi).map(|(_, c)| *c).sum()
    }

    /// True if any occurrence falls in `[lo, hi)`.
    pub fn has_data_in(&self, lo: Timestamp, hi: Timestamp) -> bool {
        self.range(lo, hi).next().is_some()
    }

    /// Add the points of `other` that fall in `[lo, hi)` into `self`.
    ///
    /// Returns the number of occurrences added.
    pub fn add_range(&mut self, other: &SparseTimeSeries, lo: Timestamp, hi: Timestamp) -> u64 {
        let mut added = 0;
        for (at, count) in other.range(lo, hi) {
            self.record(*at, *count);
            added += count;
        }
        added
    }

    /// Add every point of `other` into `self`.
    pub fn add_all(&mut self, other: &SparseTimeSeries) {
        for (at, count) in other.iter() {
            self.record(*at, *count);
        }
    }

    /// Remove the points of `other` that fall in `[lo, hi)` from `self`.
    ///
    /// `other` must have been added before; removing more than is present means the
    /// caller's bookkeeping is broken and is reported as [`Error::Invariant`]. Points
    /// that drop to zero are deleted. Returns the number of occurrences removed.
    pub fn subtract_range(
        &mut self,
        other: &SparseTimeSeries,
        lo: Timestamp,
        hi: Timestamp,
    ) -> Result<u64> {
        let mut removed = 0;
        for (at, count) in other.range(lo, hi) {
            let Some(slot) = self.points.get_mut(at) else {
                return Err(Error::Invariant(format!(
                    "removing {count} occurrences at {at} that were never added"
                )));
            };
            if *slot < *count {
                return Err(Error::Invariant(format!(
                    "removing {count} occurrences at {at} but only {slot} present"
                )));
            }
            *slot -= count;
            if *slot == 0 {
                self.points.remove(at);
            }
            removed += count;
        }
        Ok(removed)
    }
}

impl FromIterator<(Timestamp, u64)> for SparseTimeSeries {
    fn from_iter<I: IntoIterator<Item = (Timestamp, u64)>>(iter: I) -> Self {
        let mut series = Self::new();
        for (at, count) in iter {
            series.record(at, count);
        }
        series
    }
}
