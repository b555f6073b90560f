// SPDX-License-Identifier: AGPL-3.0-or-later
// QuiverDB - Concurrent Vector Search Engine
// Copyright (C) 2026 QuiverDB contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Per-node, per-level neighbor list with atomic publication.
//!
//! A neighbor list is an immutable, score-descending [`NeighborList`]
//! published through an [`ArcSwap`]. Writers snapshot the current list,
//! compose a replacement, and compare-and-swap it in; a lost race is
//! replayed against the winner's list. Readers load a guard and iterate a
//! fully-formed snapshot with no locking. Superseded lists are reclaimed by
//! refcount once the last reader drops them.
//!
//! Membership is governed by the relative-neighborhood diversity rule: a
//! candidate `c` joins the list only if no already-kept neighbor `a` is
//! closer to `c` than this set's owner is (`score(c, a) < score(c, owner)`).
//! When a reciprocal insertion lands on a full list the whole union is
//! re-pruned under the same rule, which doubles as the fallback: if every
//! member stays diverse, the lowest-scored one is dropped.

use std::sync::Arc;

use arc_swap::ArcSwap;
use smallvec::SmallVec;

use quiver_core::Result;

use crate::metrics;
use crate::neighbor_queue::ScoredNode;

/// Pairwise node scoring callback used during diversity checks. Scores are
/// in similarity orientation (higher = closer), matching the stored
/// member-to-owner scores.
pub trait NodeScorer {
    fn score(&mut self, a: u32, b: u32) -> Result<f32>;
}

/// Published snapshot of a neighbor list, sorted by descending score with
/// ties on the smaller node id.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    entries: Vec<ScoredNode>,
}

impl NeighborList {
    pub fn entries(&self) -> &[ScoredNode] {
        &self.entries
    }

    pub fn nodes(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|e| e.node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: u32) -> bool {
        self.entries.iter().any(|e| e.node == node)
    }
}

#[inline]
fn by_score_desc(a: &ScoredNode, b: &ScoredNode) -> std::cmp::Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then(a.node.cmp(&b.node))
}

pub struct ConcurrentNeighborSet {
    /// The node whose neighbors these are.
    node: u32,
    /// Capacity at quiescence (M, or 2M on the base layer).
    capacity: usize,
    list: ArcSwap<NeighborList>,
}

impl ConcurrentNeighborSet {
    pub fn new(node: u32, capacity: usize) -> Self {
        Self {
            node,
            capacity,
            list: ArcSwap::from_pointee(NeighborList::default()),
        }
    }

    pub fn node(&self) -> u32 {
        self.node
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.load().is_empty()
    }

    pub fn contains(&self, node: u32) -> bool {
        self.list.load().contains(node)
    }

    /// A consistent snapshot of the current members, safe to hold across
    /// concurrent mutation.
    pub fn snapshot(&self) -> Arc<NeighborList> {
        self.list.load_full()
    }

    /// Merge `candidates` (scored against this set's owner, any order) into
    /// the member list, re-applying the diversity rule to the union and
    /// keeping at most `capacity` members.
    pub fn insert_diverse(
        &self,
        candidates: &[ScoredNode],
        scorer: &mut dyn NodeScorer,
    ) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        let mut current = self.list.load();
        loop {
            let merged = self.merge(current.entries(), candidates);
            let selected = self.select_diverse(&merged, scorer)?;
            let prev = self
                .list
                .compare_and_swap(&current, Arc::new(NeighborList { entries: selected }));
            if Arc::ptr_eq(&prev, &current) {
                return Ok(());
            }
            metrics::CAS_RETRY_TOTAL.inc();
            current = prev;
        }
    }

    /// Reciprocal insertion from `node`'s side of a new arc. Below capacity
    /// the member is appended without a diversity check; on a full list the
    /// union is re-pruned, which may displace an existing member (or the
    /// newcomer itself).
    pub fn insert_not_diverse(
        &self,
        node: u32,
        score: f32,
        scorer: &mut dyn NodeScorer,
    ) -> Result<()> {
        if node == self.node {
            return Ok(());
        }
        let mut current = self.list.load();
        loop {
            if current.contains(node) {
                return Ok(());
            }
            let entries = if current.len() < self.capacity {
                let mut entries = current.entries().to_vec();
                let probe = ScoredNode { node, score };
                let at = entries
                    .binary_search_by(|e| by_score_desc(e, &probe))
                    .unwrap_or_else(|i| i);
                entries.insert(at, probe);
                entries
            } else {
                let merged = self.merge(current.entries(), &[ScoredNode { node, score }]);
                self.select_diverse(&merged, scorer)?
            };
            let prev = self
                .list
                .compare_and_swap(&current, Arc::new(NeighborList { entries }));
            if Arc::ptr_eq(&prev, &current) {
                return Ok(());
            }
            metrics::CAS_RETRY_TOTAL.inc();
            current = prev;
        }
    }

    /// Publish `entries` directly, bypassing diversity selection. Used when
    /// seeding a graph from an initializer whose arcs are kept as-is.
    pub(crate) fn seed(&self, mut entries: Vec<ScoredNode>) {
        entries.sort_by(by_score_desc);
        entries.dedup_by_key(|e| e.node);
        entries.retain(|e| e.node != self.node);
        entries.truncate(self.capacity);
        self.list.store(Arc::new(NeighborList { entries }));
    }

    /// Estimated heap bytes for one set with the given capacity, used for
    /// incremental RAM accounting.
    pub(crate) fn ram_bytes_estimate(capacity: usize) -> usize {
        std::mem::size_of::<Self>() + capacity * std::mem::size_of::<ScoredNode>()
    }

    fn merge(&self, members: &[ScoredNode], candidates: &[ScoredNode]) -> SmallVec<[ScoredNode; 64]> {
        let mut merged: SmallVec<[ScoredNode; 64]> = SmallVec::with_capacity(members.len() + candidates.len());
        merged.extend(members.iter().copied());
        merged.extend(
            candidates
                .iter()
                .copied()
                .filter(|c| c.node != self.node),
        );
        merged.sort_by(by_score_desc);
        // A node's score against the owner is deterministic, so duplicates
        // sort adjacent.
        merged.dedup_by_key(|e| e.node);
        merged
    }

    /// Walk `merged` best-first, keeping each candidate that stays diverse
    /// against everything kept before it, up to capacity.
    fn select_diverse(
        &self,
        merged: &[ScoredNode],
        scorer: &mut dyn NodeScorer,
    ) -> Result<Vec<ScoredNode>> {
        let mut selected: Vec<ScoredNode> = Vec::with_capacity(self.capacity);
        for &candidate in merged {
            if selected.len() >= self.capacity {
                break;
            }
            if self.is_diverse(candidate, &selected, scorer)? {
                selected.push(candidate);
            }
        }
        Ok(selected)
    }

    fn is_diverse(
        &self,
        candidate: ScoredNode,
        selected: &[ScoredNode],
        scorer: &mut dyn NodeScorer,
    ) -> Result<bool> {
        for kept in selected {
            if scorer.score(candidate.node, kept.node)? >= candidate.score {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
