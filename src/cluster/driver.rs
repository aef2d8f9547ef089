//! Window-by-window driver over a whole workload.

use std::collections::BTreeMap;

use chrono::Duration;
use log::info;

use super::engine::{ClusterEngine, SingletonPolicy, Window};
use super::index::SearchMode;
use super::sampler::{WindowSampler, DEFAULT_SAMPLE_CAP};
use super::state::{
    Assignment, AssignmentHistory, Assignments, ClusterEvent, ClusterId, EngineState,
};
use crate::error::{Error, Result};
use crate::series::Timestamp;
use crate::workload::Workload;

/// Default window length: one day.
pub const DEFAULT_WINDOW_MINUTES: i64 = 1440;

/// Default lookback horizon for similarity comparisons.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// Online clustering parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OnlineParams {
    /// Similarity threshold ρ. A match needs similarity strictly above it.
    ///
    /// Typical values are in `(0, 1)`; 0.8 is a reasonable start for query workloads.
    pub rho: f64,

    /// Window length in minutes.
    pub window_minutes: i64,

    /// How far back (in days) each window compares series.
    pub lookback_days: i64,

    /// Maximum number of sampled minutes per window.
    pub sample_cap: usize,

    /// Nearest-center search, or first-match scan.
    pub search: SearchMode,

    /// Treatment of one-member clusters.
    pub singletons: SingletonPolicy,

    /// Optional RNG seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for OnlineParams {
    fn default() -> Self {
        Self {
            rho: 0.8,
            window_minutes: DEFAULT_WINDOW_MINUTES,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            sample_cap: DEFAULT_SAMPLE_CAP,
            search: SearchMode::Indexed,
            singletons: SingletonPolicy::Reevaluate,
            seed: None,
        }
    }
}

impl OnlineParams {
    fn validate(&self) -> Result<()> {
        if !self.rho.is_finite() {
            return Err(Error::InvalidParameter {
                name: "rho",
                message: "must be finite",
            });
        }
        if self.window_minutes <= 0 {
            return Err(Error::InvalidParameter {
                name: "window_minutes",
                message: "must be positive",
            });
        }
        if self.lookback_days < 0 {
            return Err(Error::InvalidParameter {
                name: "lookback_days",
                message: "must not be negative",
            });
        }
        if self.sample_cap == 0 {
            return Err(Error::InvalidParameter {
                name: "sample_cap",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Everything a run produces.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusteringOutcome {
    /// Number of cluster ids ever handed out.
    pub clusters_created: u64,
    /// One snapshot per window boundary, starting with the all-unassigned one.
    pub history: AssignmentHistory,
    /// Occurrences attributed to each cluster id, including retired ones.
    pub cluster_totals: BTreeMap<ClusterId, u64>,
    /// Membership changes, labeled with the boundary of the window that made them.
    pub events: Vec<(Timestamp, ClusterEvent)>,
}

impl ClusteringOutcome {
    /// Assignment after the last window.
    pub fn final_assignments(&self) -> Option<&Assignments> {
        self.history.last().map(|(_, a)| a)
    }

    /// Snapshot labeled exactly `at`.
    pub fn snapshot_at(&self, at: Timestamp) -> Option<&Assignments> {
        self.history
            .iter()
            .find(|(t, _)| *t == at)
            .map(|(_, a)| a)
    }

    /// Number of windows processed.
    pub fn windows(&self) -> usize {
        self.history.len().saturating_sub(1)
    }

    /// Sum of all cluster totals.
    pub fn total_attributed(&self) -> u64 {
        self.cluster_totals.values().sum()
    }

    /// Final members of `cluster`, ascending.
    pub fn members_of(&self, cluster: ClusterId) -> Vec<&str> {
        self.final_assignments()
            .into_iter()
            .flatten()
            .filter(|(_, a)| **a == Assignment::AssignedTo(cluster))
            .map(|(e, _)| e.as_str())
            .collect()
    }
}

/// Online clustering over fixed windows.
///
/// ```rust
/// use drift::{OnlineClustering, SparseTimeSeries, Workload};
/// use chrono::{Duration, NaiveDate};
///
/// let t0 = NaiveDate::from_ymd_opt(2017, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
/// let daily = |minute: i64| -> SparseTimeSeries {
///     (0..3).map(|d| (t0 + Duration::minutes(d * 1440 + minute), 5)).collect()
/// };
/// let workload = Workload::from_series([
///     ("a".to_string(), daily(60)),
///     ("b".to_string(), daily(60)),
///     ("c".to_string(), daily(720)),
/// ]);
///
/// let outcome = OnlineClustering::new(0.8).with_seed(7).fit(&workload).unwrap();
/// let last = outcome.final_assignments().unwrap();
/// assert_eq!(last["a"], last["b"]);
/// assert_ne!(last["a"], last["c"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct OnlineClustering {
    params: OnlineParams,
}

impl OnlineClustering {
    /// Create a driver with threshold `rho` and default parameters otherwise.
    pub fn new(rho: f64) -> Self {
        Self {
            params: OnlineParams {
                rho,
                ..OnlineParams::default()
            },
        }
    }

    /// Create a driver from explicit parameters.
    pub fn with_params(params: OnlineParams) -> Self {
        Self { params }
    }

    /// Set the similarity threshold.
    pub fn with_rho(mut self, rho: f64) -> Self {
        self.params.rho = rho;
        self
    }

    /// Set the window length in minutes.
    pub fn with_window_minutes(mut self, minutes: i64) -> Self {
        self.params.window_minutes = minutes;
        self
    }

    /// Set the lookback horizon in days.
    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.params.lookback_days = days;
        self
    }

    /// Set the per-window sample cap.
    pub fn with_sample_cap(mut self, cap: usize) -> Self {
        self.params.sample_cap = cap;
        self
    }

    /// Set the candidate search mode.
    pub fn with_search(mut self, search: SearchMode) -> Self {
        self.params.search = search;
        self
    }

    /// Set the one-member-cluster policy.
    pub fn with_singletons(mut self, singletons: SingletonPolicy) -> Self {
        self.params.singletons = singletons;
        self
    }

    /// Set the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.params.seed = Some(seed);
        self
    }

    /// Parameters in use.
    pub fn params(&self) -> &OnlineParams {
        &self.params
    }

    /// Run every window from the first to the last observed timestamp.
    ///
    /// A workload spanning less than one window yields only the initial snapshot.
    pub fn fit(&self, workload: &Workload) -> Result<ClusteringOutcome> {
        self.params.validate()?;
        let (start, end) = workload.bounds().ok_or(Error::EmptyInput)?;

        let window = Duration::minutes(self.params.window_minutes);
        let lookback = Duration::days(self.params.lookback_days);
        let span_minutes = (end - start).num_minutes() + 1;
        let num_windows = span_minutes / self.params.window_minutes;
        info!(
            "clustering {} entities over {num_windows} windows from {start} (rho = {})",
            workload.len(),
            self.params.rho
        );

        let mut state = EngineState::new(workload.entities());
        let mut history: AssignmentHistory = Vec::with_capacity(num_windows as usize + 1);
        history.push((start, state.assignments.clone()));
        let mut events = Vec::new();

        let sampler = WindowSampler::new(self.params.sample_cap, self.params.seed);
        let mut engine = ClusterEngine::new(workload, self.params.rho, sampler)
            .with_search(self.params.search)
            .with_singletons(self.params.singletons);

        let mut current = start;
        for _ in 0..num_windows {
            let next = current + window;
            let bounds = Window {
                lookback: (current - lookback).max(start),
                current,
                next,
            };
            let step = engine.step(state, &bounds)?;
            state = step.state;
            events.extend(step.events.into_iter().map(|e| (next, e)));
            history.push((next, state.assignments.clone()));
            current = next;
        }

        let attributed: u64 = state.totals.values().sum();
        info!(
            "{} clusters created, {} live; {attributed} of {} occurrences attributed",
            state.next_id,
            state.clusters.len(),
            workload.grand_total()
        );

        Ok(ClusteringOutcome {
            clusters_created: state.next_id,
            history,
            cluster_totals: state.totals,
            events,
        })
    }
}
