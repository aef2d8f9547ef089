//! Online clustering of recurring workload entities.
//!
//! `drift` groups entities (typically SQL query templates) whose arrival-rate time
//! series have the same shape, and keeps those groups up to date one window at a
//! time as new data arrives.
//!
//! The primary public API is under [`cluster`], which provides:
//! - [`OnlineClustering`]: the window-by-window driver
//! - [`ClusterEngine`]: a single window's update (stability, reassignment, creation, merging)
//! - [`NeighborIndex`] and [`WindowSampler`]: the pieces that keep each window cheap
//!
//! Input comes in as a [`Workload`], either built in memory or loaded from a
//! directory of per-template CSV files.

#![forbid(unsafe_code)]

pub mod cluster;
pub mod error;
pub mod series;
pub mod workload;

pub use cluster::{
    Assignment, ClusterEngine, ClusterId, ClusteringOutcome, NeighborIndex, OnlineClustering,
    OnlineParams, SearchMode, SingletonPolicy, WindowSampler,
};
pub use error::{Error, Result};
pub use series::{SparseTimeSeries, Timestamp};
pub use workload::Workload;
