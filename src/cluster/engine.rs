//! One window of incremental clustering.
//!
//! # Window transition
//!
//! Given the state left by the previous window and a window `[current, next)` with a
//! lookback bound `lookback <= current`, [`ClusterEngine::step`] runs, in order:
//!
//! 1. **Center maintenance**: every assigned entity's counts in `[current, next)` are
//!    added to its cluster's center (and to the cluster's running total).
//! 2. **Sampling**: one sample set over `[lookback, next)`, shared by every
//!    similarity evaluated in this window.
//! 3. **Assignment pass**, entities in ascending id order:
//!    - an assigned entity whose similarity to its own center is `> rho` stays;
//!    - otherwise it departs (its `[lookback, next)` contribution is removed);
//!    - unassigned entities with nothing in `[current, next)` have not arrived and
//!      are skipped;
//!    - everything else joins the best candidate above `rho`, or founds a new
//!      cluster.
//! 4. **Retirement** of clusters left without members.
//! 5. **Merge pass**, clusters in ascending id order: each is folded into its nearest
//!    other cluster if their similarity is `> rho`. Targets already merged away in
//!    this pass are resolved to whatever absorbed them.
//!
//! Later steps read state mutated by earlier ones (an entity's decision sees the
//! centers as left by every entity before it), so the order is part of the result.
//! Equality with `rho` never matches.

use std::collections::BTreeMap;

use log::{debug, info};

use super::index::{NeighborIndex, SearchMode};
use super::sampler::WindowSampler;
use super::similarity::similarity;
use super::state::{Assignment, ClusterEvent, ClusterId, ClusterState, EngineState, EntityId};
use super::util::DisjointSet;
use crate::error::{Error, Result};
use crate::series::{SparseTimeSeries, Timestamp};
use crate::workload::Workload;

/// What happens to the only member of a one-member cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SingletonPolicy {
    /// Never considered stable: the member departs and is matched again from
    /// scratch every window.
    #[default]
    Reevaluate,
    /// Always considered stable, without a similarity check.
    Keep,
}

/// Bounds of one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// Oldest minute that similarity comparisons look at.
    pub lookback: Timestamp,
    /// Start of the new data (inclusive).
    pub current: Timestamp,
    /// End of the new data (exclusive); the snapshot is labeled with it.
    pub next: Timestamp,
}

/// Result of one [`ClusterEngine::step`].
#[derive(Debug, Clone)]
pub struct WindowStep {
    /// State to hand to the next window.
    pub state: EngineState,
    /// Membership changes made in this window, in the order they happened.
    pub events: Vec<ClusterEvent>,
}

/// Per-window update procedure over one workload.
#[derive(Debug)]
pub struct ClusterEngine<'w> {
    workload: &'w Workload,
    rho: f64,
    search: SearchMode,
    singletons: SingletonPolicy,
    sampler: WindowSampler,
}

fn not_live(id: ClusterId) -> Error {
    Error::Invariant(format!("cluster {id} is referenced but not live"))
}

impl<'w> ClusterEngine<'w> {
    /// Create an engine. `sampler` supplies every window's sample set.
    pub fn new(workload: &'w Workload, rho: f64, sampler: WindowSampler) -> Self {
        Self {
            workload,
            rho,
            search: SearchMode::default(),
            singletons: SingletonPolicy::default(),
            sampler,
        }
    }

    /// Set how candidate clusters are searched.
    pub fn with_search(mut self, search: SearchMode) -> Self {
        self.search = search;
        self
    }

    /// Set the one-member-cluster policy.
    pub fn with_singletons(mut self, singletons: SingletonPolicy) -> Self {
        self.singletons = singletons;
        self
    }

    /// Similarity threshold.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Process one window.
    ///
    /// Fails only on broken bookkeeping ([`Error::Invariant`]); the returned state is
    /// then unusable and the run should stop.
    pub fn step(&mut self, mut state: EngineState, window: &Window) -> Result<WindowStep> {
        let mut events = Vec::new();

        self.maintain_centers(&mut state, window)?;
        let samples = self.sampler.sample(window.lookback, window.next);
        self.assign_entities(&mut state, window, &samples, &mut events)?;
        retire_empty(&mut state, window, &mut events);
        self.merge_clusters(&mut state, window, &samples, &mut events)?;

        state.validate()?;
        info!(
            "{}: {} live clusters, {} created so far, {} events, {} samples",
            window.next,
            state.clusters.len(),
            state.next_id,
            events.len(),
            samples.len()
        );

        Ok(WindowStep { state, events })
    }

    fn total_of(&self, entity: &EntityId) -> u64 {
        self.workload.total(entity).unwrap_or(0)
    }

    /// Add every assigned entity's new data to its center.
    fn maintain_centers(&self, state: &mut EngineState, window: &Window) -> Result<()> {
        for (entity, assignment) in &state.assignments {
            let Assignment::AssignedTo(id) = *assignment else {
                continue;
            };
            let Some(data) = self.workload.series(entity) else {
                continue;
            };
            let cluster = state.clusters.get_mut(&id).ok_or_else(|| not_live(id))?;
            let added = cluster.center.add_range(data, window.current, window.next);
            *state.totals.entry(id).or_insert(0) += added;
        }
        Ok(())
    }

    fn assign_entities(
        &self,
        state: &mut EngineState,
        window: &Window,
        samples: &[Timestamp],
        events: &mut Vec<ClusterEvent>,
    ) -> Result<()> {
        let index = match self.search {
            SearchMode::Indexed => {
                debug!("{}: building assignment index", window.next);
                NeighborIndex::build(
                    state.clusters.iter().map(|(id, c)| (*id, &c.center)),
                    samples,
                )
            }
            SearchMode::Exhaustive => None,
        };

        for (entity, data) in self.workload.iter() {
            let previous = state
                .assignments
                .get(entity)
                .copied()
                .ok_or_else(|| Error::Invariant(format!("entity {entity:?} has no assignment")))?;

            let departed_from = match previous {
                Assignment::AssignedTo(id) => {
                    let cluster = state.clusters.get(&id).ok_or_else(|| not_live(id))?;
                    if self.is_stable(data, cluster, samples) {
                        continue;
                    }
                    let cluster = state.clusters.get_mut(&id).ok_or_else(|| not_live(id))?;
                    cluster
                        .center
                        .subtract_range(data, window.lookback, window.next)?;
                    cluster.members = cluster.members.checked_sub(1).ok_or_else(|| {
                        Error::Invariant(format!("cluster {id} lost a member it did not have"))
                    })?;
                    debug!(
                        "{}: {entity:?} quit cluster {id} (total {})",
                        window.next,
                        self.total_of(entity)
                    );
                    events.push(ClusterEvent::Departed {
                        entity: entity.clone(),
                        cluster: id,
                    });
                    Some(id)
                }
                Assignment::Unassigned => {
                    if !data.has_data_in(window.current, window.next) {
                        continue;
                    }
                    None
                }
            };

            let candidate =
                self.find_candidate(&state.clusters, index.as_ref(), data, samples)?;
            let target = match candidate {
                Some(to) => {
                    let cluster = state.clusters.get_mut(&to).ok_or_else(|| not_live(to))?;
                    cluster.center.add_range(data, window.lookback, window.next);
                    cluster.members += 1;
                    let event = match departed_from {
                        None => ClusterEvent::Joined {
                            entity: entity.clone(),
                            cluster: to,
                        },
                        Some(from) => ClusterEvent::Reassigned {
                            entity: entity.clone(),
                            from,
                            to,
                        },
                    };
                    debug!(
                        "{}: {entity:?} {} cluster {to} (total {})",
                        window.next,
                        if departed_from.is_none() { "joined" } else { "reassigned to" },
                        self.total_of(entity)
                    );
                    events.push(event);
                    to
                }
                None => {
                    let id = state.create_cluster();
                    let cluster = state.clusters.get_mut(&id).ok_or_else(|| not_live(id))?;
                    cluster.center.add_range(data, window.lookback, window.next);
                    cluster.members = 1;
                    let event = match departed_from {
                        None => ClusterEvent::Created {
                            entity: entity.clone(),
                            cluster: id,
                        },
                        Some(from) => ClusterEvent::Recreated {
                            entity: entity.clone(),
                            from,
                            cluster: id,
                        },
                    };
                    debug!(
                        "{}: {entity:?} {} cluster {id} (total {})",
                        window.next,
                        if departed_from.is_none() { "created" } else { "recreated" },
                        self.total_of(entity)
                    );
                    events.push(event);
                    id
                }
            };
            state
                .assignments
                .insert(entity.clone(), Assignment::AssignedTo(target));
        }
        Ok(())
    }

    fn is_stable(
        &self,
        data: &SparseTimeSeries,
        cluster: &ClusterState,
        samples: &[Timestamp],
    ) -> bool {
        if cluster.members == 1 {
            return self.singletons == SingletonPolicy::Keep;
        }
        similarity(data, &cluster.center, samples) > self.rho
    }

    /// Cluster `data` should join, if any clears the threshold.
    ///
    /// With an index the single nearest center is checked; without one (exhaustive
    /// mode, or no clusters when the window started) live clusters are scanned in id
    /// order and the first one above the threshold wins.
    fn find_candidate(
        &self,
        clusters: &BTreeMap<ClusterId, ClusterState>,
        index: Option<&NeighborIndex>,
        data: &SparseTimeSeries,
        samples: &[Timestamp],
    ) -> Result<Option<ClusterId>> {
        match index {
            Some(index) => {
                let probe = NeighborIndex::probe(data, samples);
                let Some(id) = index.nearest(&probe) else {
                    return Ok(None);
                };
                let center = &clusters.get(&id).ok_or_else(|| not_live(id))?.center;
                Ok((similarity(data, center, samples) > self.rho).then_some(id))
            }
            None => Ok(clusters
                .iter()
                .find(|(_, c)| similarity(data, &c.center, samples) > self.rho)
                .map(|(id, _)| *id)),
        }
    }

    fn merge_clusters(
        &self,
        state: &mut EngineState,
        window: &Window,
        samples: &[Timestamp],
        events: &mut Vec<ClusterEvent>,
    ) -> Result<()> {
        let ids: Vec<ClusterId> = state.clusters.keys().copied().collect();
        let index = match self.search {
            SearchMode::Indexed => {
                debug!("{}: building merge index", window.next);
                NeighborIndex::build(
                    state.clusters.iter().map(|(id, c)| (*id, &c.center)),
                    samples,
                )
            }
            SearchMode::Exhaustive => None,
        };
        let mut roots = DisjointSet::new();

        for (i, &c1) in ids.iter().enumerate() {
            let source = &state.clusters.get(&c1).ok_or_else(|| not_live(c1))?.center;

            let target = match &index {
                Some(index) => {
                    let probe = NeighborIndex::probe(source, samples);
                    match index.nearest_other(c1, &probe).map(|n| roots.find(n)) {
                        Some(t) if t != c1 => {
                            let other =
                                &state.clusters.get(&t).ok_or_else(|| not_live(t))?.center;
                            (similarity(source, other, samples) > self.rho).then_some(t)
                        }
                        _ => None,
                    }
                }
                None => {
                    let mut found = None;
                    for &c2 in &ids[i + 1..] {
                        let other =
                            &state.clusters.get(&c2).ok_or_else(|| not_live(c2))?.center;
                        if similarity(source, other, samples) > self.rho {
                            found = Some(c2);
                            break;
                        }
                    }
                    found
                }
            };

            if let Some(into) = target {
                let moved = merge(state, c1, into)?;
                roots.merge_into(c1, into);
                debug!(
                    "{}: cluster {c1} merged into cluster {into} ({moved} members)",
                    window.next
                );
                events.push(ClusterEvent::Merged {
                    absorbed: c1,
                    into,
                    moved,
                });
            }
        }
        Ok(())
    }
}

/// Fold cluster `absorbed` into `into` and repoint its members. Returns how many
/// entities moved.
fn merge(state: &mut EngineState, absorbed: ClusterId, into: ClusterId) -> Result<usize> {
    let gone = state
        .clusters
        .remove(&absorbed)
        .ok_or_else(|| not_live(absorbed))?;
    let survivor = state.cluster_mut(into)?;
    survivor.center.add_all(&gone.center);
    survivor.members += gone.members;

    let mut moved = 0;
    for assignment in state.assignments.values_mut() {
        if *assignment == Assignment::AssignedTo(absorbed) {
            *assignment = Assignment::AssignedTo(into);
            moved += 1;
        }
    }
    if moved != gone.members {
        return Err(Error::Invariant(format!(
            "cluster {absorbed} recorded {} members but {moved} were assigned to it",
            gone.members
        )));
    }
    Ok(moved)
}

fn retire_empty(state: &mut EngineState, window: &Window, events: &mut Vec<ClusterEvent>) {
    let empty: Vec<ClusterId> = state
        .clusters
        .iter()
        .filter(|(_, c)| c.members == 0)
        .map(|(id, _)| *id)
        .collect();
    for id in empty {
        state.clusters.remove(&id);
        debug!("{}: cluster {id} has no members left", window.next);
        events.push(ClusterEvent::Emptied { cluster: id });
    }
}
