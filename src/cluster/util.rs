use std::collections::HashMap;

use super::state::ClusterId;

/// Disjoint-set over cluster ids, scoped to one merge pass.
///
/// Keys are ids rather than positions so the structure does not care how many
/// clusters existed when the pass started. Unlike a size-balanced union-find, a
/// merge always points the absorbed cluster at the surviving one: the survivor's id
/// is what members end up labeled with.
#[derive(Clone, Debug, Default)]
pub(crate) struct DisjointSet {
    parent: HashMap<ClusterId, ClusterId>,
}

impl DisjointSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Current surviving id for `x`. Ids never merged are their own root.
    pub(crate) fn find(&mut self, x: ClusterId) -> ClusterId {
        let Some(&p) = self.parent.get(&x) else {
            return x;
        };
        let root = self.find(p);
        if root != p {
            self.parent.insert(x, root);
        }
        root
    }

    /// Record that `absorbed` now lives on as `survivor`.
    ///
    /// Returns the root `absorbed` resolves to afterwards.
    pub(crate) fn merge_into(&mut self, absorbed: ClusterId, survivor: ClusterId) -> ClusterId {
        let ra = self.find(absorbed);
        let rs = self.find(survivor);
        if ra != rs {
            self.parent.insert(ra, rs);
        }
        rs
    }
}

#[inline]
pub(crate) fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
