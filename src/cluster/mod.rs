//! Incremental clustering of entities by the shape of their arrival-rate series.
//!
//! Time is cut into fixed windows (a day by default). Each window consumes only the
//! data that arrived since the previous one, plus a bounded lookback sample used to
//! compare shapes, and updates cluster membership in place. Nothing is ever
//! re-clustered from scratch.
//!
//! ## Similarity
//!
//! Two series are compared with cosine similarity over a set of sampled minutes:
//!
//! ```text
//! sim(x, y) = Σ x_t y_t / (sqrt(Σ x_t² · Σ y_t²) + ε),   t ∈ samples,  ε = 1e-6
//! ```
//!
//! Cosine ignores volume: a template issued 10× as often with the same daily rhythm
//! is as similar as an identical one. An entity belongs to a cluster while its
//! similarity to the cluster's *center* (the sum of its members' series) stays
//! strictly above the threshold ρ.
//!
//! ## Sampling
//!
//! A 30-day lookback at minute resolution is 43 200 dimensions. Each window draws at
//! most 10 000 of those minutes ([`WindowSampler`]) and evaluates every similarity of
//! that window on the same draw.
//!
//! ## Candidate search
//!
//! Finding the cluster an entity should join is a nearest-neighbor query over the
//! normalized, sampled centers ([`NeighborIndex`]). [`SearchMode::Exhaustive`]
//! instead scans clusters in id order and takes the first above ρ, which can differ
//! from the nearest one close to the threshold.
//!
//! ## Usage
//!
//! ```rust
//! use drift::cluster::{Assignment, OnlineClustering, SearchMode};
//! use drift::{SparseTimeSeries, Workload};
//! use chrono::{Duration, NaiveDate};
//!
//! let t0 = NaiveDate::from_ymd_opt(2016, 10, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
//! let series: SparseTimeSeries =
//!     (0..4).map(|d| (t0 + Duration::minutes(d * 1440 + 90), 3)).collect();
//! let workload = Workload::from_series([("SELECT 1".to_string(), series)]);
//!
//! let outcome = OnlineClustering::new(0.8)
//!     .with_search(SearchMode::Exhaustive)
//!     .with_seed(42)
//!     .fit(&workload)
//!     .unwrap();
//!
//! assert_eq!(outcome.history[0].1["SELECT 1"], Assignment::Unassigned);
//! assert!(outcome.final_assignments().unwrap()["SELECT 1"].is_assigned());
//! ```

mod driver;
mod engine;
mod index;
mod sampler;
mod similarity;
mod state;
mod util;

pub use driver::{
    ClusteringOutcome, OnlineClustering, OnlineParams, DEFAULT_LOOKBACK_DAYS,
    DEFAULT_WINDOW_MINUTES,
};
pub use engine::{ClusterEngine, SingletonPolicy, Window, WindowStep};
pub use index::{NeighborIndex, SearchMode};
pub use sampler::{WindowSampler, DEFAULT_SAMPLE_CAP};
pub use similarity::{project, similarity, SIMILARITY_EPSILON};
pub use state::{
    Assignment, AssignmentHistory, Assignments, ClusterEvent, ClusterId, ClusterState,
    EngineState, EntityId,
};
