//! Cluster bookkeeping carried from one window to the next.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::series::{SparseTimeSeries, Timestamp};

/// Entity identifier (the template text for query workloads).
pub type EntityId = String;

/// Cluster identifier. Allocated in increasing order, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClusterId(pub u64);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an entity sits at a window boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Assignment {
    /// Not in any cluster: not arrived yet, or never seen.
    #[default]
    Unassigned,
    /// Member of the given cluster.
    AssignedTo(ClusterId),
}

impl Assignment {
    /// The cluster, if assigned.
    pub fn cluster(self) -> Option<ClusterId> {
        match self {
            Assignment::Unassigned => None,
            Assignment::AssignedTo(id) => Some(id),
        }
    }

    /// True for [`Assignment::AssignedTo`].
    pub fn is_assigned(self) -> bool {
        matches!(self, Assignment::AssignedTo(_))
    }
}

/// Entity → assignment at one window boundary, ordered by entity id.
pub type Assignments = BTreeMap<EntityId, Assignment>;

/// One live cluster.
#[derive(Clone, Debug)]
pub struct ClusterState {
    /// This cluster's id.
    pub id: ClusterId,
    /// Summed series of the current members.
    pub center: SparseTimeSeries,
    /// Number of entities currently assigned.
    pub members: usize,
}

impl ClusterState {
    pub(crate) fn new(id: ClusterId) -> Self {
        Self {
            id,
            center: SparseTimeSeries::new(),
            members: 0,
        }
    }
}

/// A membership change made while processing a window.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ClusterEvent {
    /// A previously unassigned entity joined an existing cluster.
    Joined {
        /// Entity.
        entity: EntityId,
        /// Cluster joined.
        cluster: ClusterId,
    },
    /// An entity moved from one existing cluster to another.
    Reassigned {
        /// Entity.
        entity: EntityId,
        /// Cluster it left.
        from: ClusterId,
        /// Cluster it joined.
        to: ClusterId,
    },
    /// An entity stopped matching its cluster and was taken out of it.
    Departed {
        /// Entity.
        entity: EntityId,
        /// Cluster it left.
        cluster: ClusterId,
    },
    /// A previously unassigned entity matched nothing and started a cluster.
    Created {
        /// Entity.
        entity: EntityId,
        /// New cluster.
        cluster: ClusterId,
    },
    /// A departed entity matched nothing and started a cluster.
    Recreated {
        /// Entity.
        entity: EntityId,
        /// Cluster it left.
        from: ClusterId,
        /// New cluster.
        cluster: ClusterId,
    },
    /// Two clusters were merged; `absorbed` is retired.
    Merged {
        /// Retired cluster.
        absorbed: ClusterId,
        /// Surviving cluster.
        into: ClusterId,
        /// Members moved over.
        moved: usize,
    },
    /// A cluster lost its last member and was retired.
    Emptied {
        /// Retired cluster.
        cluster: ClusterId,
    },
}

/// Everything one window hands to the next.
///
/// Moved into [`ClusterEngine::step`](super::ClusterEngine::step) and returned
/// updated, so a window never observes state another window is still mutating.
#[derive(Clone, Debug, Default)]
pub struct EngineState {
    /// Live clusters, by id.
    pub clusters: BTreeMap<ClusterId, ClusterState>,
    /// Assignment at the last processed window boundary.
    pub assignments: Assignments,
    /// Next id to hand out; also the number of clusters ever created.
    pub next_id: u64,
    /// Occurrences attributed to each cluster id over the run. Entries outlive
    /// the cluster they belong to.
    pub totals: BTreeMap<ClusterId, u64>,
}

impl EngineState {
    /// Initial state: every entity unassigned, no clusters.
    pub fn new<'a, I>(entities: I) -> Self
    where
        I: IntoIterator<Item = &'a EntityId>,
    {
        Self {
            assignments: entities
                .into_iter()
                .map(|e| (e.clone(), Assignment::Unassigned))
                .collect(),
            ..Self::default()
        }
    }

    /// Allocate a fresh cluster and return its id.
    pub(crate) fn create_cluster(&mut self) -> ClusterId {
        let id = ClusterId(self.next_id);
        self.next_id += 1;
        self.clusters.insert(id, ClusterState::new(id));
        self.totals.insert(id, 0);
        id
    }

    /// Live cluster `id`, or an invariant error if it does not exist.
    pub(crate) fn cluster_mut(&mut self, id: ClusterId) -> Result<&mut ClusterState> {
        self.clusters
            .get_mut(&id)
            .ok_or_else(|| Error::Invariant(format!("cluster {id} is referenced but not live")))
    }

    /// Check that every assignment points at a live cluster and member counts agree.
    pub fn validate(&self) -> Result<()> {
        let mut counted: BTreeMap<ClusterId, usize> = BTreeMap::new();
        for (entity, a) in &self.assignments {
            if let Assignment::AssignedTo(id) = a {
                if !self.clusters.contains_key(id) {
                    return Err(Error::Invariant(format!(
                        "entity {entity:?} assigned to missing cluster {id}"
                    )));
                }
                *counted.entry(*id).or_insert(0) += 1;
            }
        }
        for (id, c) in &self.clusters {
            let n = counted.get(id).copied().unwrap_or(0);
            if n != c.members {
                return Err(Error::Invariant(format!(
                    "cluster {id} records {} members but {n} entities point at it",
                    c.members
                )));
            }
            if id.0 >= self.next_id {
                return Err(Error::Invariant(format!(
                    "cluster {id} is not below the id counter {}",
                    self.next_id
                )));
            }
        }
        Ok(())
    }
}

/// Assignment snapshots, one per window boundary, oldest first.
pub type AssignmentHistory = Vec<(Timestamp, Assignments)>;
