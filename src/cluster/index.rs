//! Nearest-center search over sampled, normalized center vectors.
//!
//! Each window projects every cluster center onto the window's sample minutes and
//! L2-normalizes the rows. On unit vectors, the smallest Euclidean distance is the
//! largest cosine, so "nearest" here agrees with [`similarity`](super::similarity)
//! up to the epsilon floor.
//!
//! The index is flat: vectors live in one contiguous buffer and a query scans all of
//! them. With a few hundred to a few thousand live clusters and up to 10k sample
//! dimensions this is both exact and cache-friendly; tree indexes degrade to a scan
//! at this dimensionality anyway.

use super::similarity::{normalize_in_place, project};
use super::state::ClusterId;
use super::util::squared_euclidean;
use crate::series::{SparseTimeSeries, Timestamp};

/// How candidate clusters are found for an entity (and merge partners for a cluster).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchMode {
    /// Query a [`NeighborIndex`] for the single nearest center, then test it against ρ.
    #[default]
    Indexed,
    /// Scan clusters in ascending id order and take the first one above ρ.
    ///
    /// Near the threshold this can pick a different cluster than `Indexed`: the
    /// first acceptable cluster is not necessarily the nearest.
    Exhaustive,
}

/// Exact nearest-neighbor index over one window's cluster centers.
#[derive(Debug, Clone)]
pub struct NeighborIndex {
    ids: Vec<ClusterId>,
    dim: usize,
    vectors: Vec<f32>,
}

impl NeighborIndex {
    /// Build an index over `centers`, projected onto `samples`.
    ///
    /// Rows are stored in iteration order, which callers keep ascending by id so
    /// that distance ties resolve to the lower id. Returns `None` for an empty
    /// cluster set: every lookup against an absent index is "no candidate".
    pub fn build<'a, I>(centers: I, samples: &[Timestamp]) -> Option<Self>
    where
        I: IntoIterator<Item = (ClusterId, &'a SparseTimeSeries)>,
    {
        let dim = samples.len();
        let mut ids = Vec::new();
        let mut vectors = Vec::new();
        for (id, center) in centers {
            let mut row = project(center, samples);
            normalize_in_place(&mut row);
            ids.push(id);
            vectors.extend_from_slice(&row);
        }
        if ids.is_empty() {
            return None;
        }
        Some(Self { ids, dim, vectors })
    }

    /// Number of indexed centers.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false; an empty index is never built.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Normalized projection of `series`, ready to be used as a probe.
    pub fn probe(series: &SparseTimeSeries, samples: &[Timestamp]) -> Vec<f32> {
        let mut v = project(series, samples);
        normalize_in_place(&mut v);
        v
    }

    #[inline]
    fn row(&self, i: usize) -> &[f32] {
        &self.vectors[i * self.dim..(i + 1) * self.dim]
    }

    /// The `k` nearest rows to `probe`, closest first (ties: lower row first).
    fn k_nearest(&self, probe: &[f32], k: usize) -> Vec<(usize, f32)> {
        debug_assert_eq!(probe.len(), self.dim);
        let mut best: Vec<(usize, f32)> = Vec::with_capacity(k + 1);
        for i in 0..self.ids.len() {
            let d = squared_euclidean(probe, self.row(i));
            // Strict comparison keeps the earlier row on ties.
            let pos = best.iter().position(|&(_, bd)| d < bd).unwrap_or(best.len());
            if pos < k {
                best.insert(pos, (i, d));
                best.truncate(k);
            }
        }
        best
    }

    /// Nearest center to `probe`.
    pub fn nearest(&self, probe: &[f32]) -> Option<ClusterId> {
        self.k_nearest(probe, 1).first().map(|&(i, _)| self.ids[i])
    }

    /// Nearest center to `probe` other than `own`, where `probe` is (a current view
    /// of) the vector indexed under `own`.
    ///
    /// Asks for two neighbors: if the closest is `own` itself the second one is the
    /// answer, otherwise the closest is. Returns `None` when `own` is the only
    /// indexed center.
    pub fn nearest_other(&self, own: ClusterId, probe: &[f32]) -> Option<ClusterId> {
        let two = self.k_nearest(probe, 2);
        match two.as_slice() {
            [(first, _), rest @ ..] if self.ids[*first] == own => {
                rest.first().map(|&(i, _)| self.ids[i])
            }
            [(first, _), ..] => Some(self.ids[*first]),
            [] => None,
        }
    }
}
