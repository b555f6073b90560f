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

//! Greedy beam search over the layered graph.
//!
//! Search descends from the entry point with a frontier of one above the
//! base layer, then runs a best-first beam at level 0: a growing max-heap
//! frontier, a bounded min-heap of the best results so far, and a visited
//! bitset. Expansion stops when the best frontier entry scores worse than
//! the worst kept result, or when the visit budget runs out (the returned
//! queue is then marked incomplete).
//!
//! The acceptance predicate filters what is *returned*, not what is
//! *traversed*: rejected nodes still join the frontier so the walk can
//! route through them. Every scored node counts against the budget.

use tracing::trace;

use quiver_core::{Bits, FixedBitSet, Result, Similarity, VectorCursor, VectorData};

use crate::graph::GraphView;
use crate::metrics;
use crate::neighbor_queue::{NeighborQueue, Orientation};

/// Reusable search state. One searcher per thread; the scratch bitset is
/// recycled across calls instead of reallocated.
pub struct GraphSearcher {
    visited: FixedBitSet,
}

impl Default for GraphSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphSearcher {
    pub fn new() -> Self {
        Self {
            visited: FixedBitSet::with_capacity(256),
        }
    }

    /// Approximate top-`top_k` search for `query`. Returns a min-oriented
    /// queue: `pop` yields the worst kept result first, `nodes()` lists
    /// ids best-first. An empty graph yields an empty queue.
    #[allow(clippy::too_many_arguments)]
    pub fn search<C: VectorCursor + ?Sized>(
        &mut self,
        query: &VectorData,
        top_k: usize,
        cursor: &mut C,
        similarity: Similarity,
        view: &GraphView<'_>,
        accept: Option<&dyn Bits>,
        visit_limit: usize,
    ) -> Result<NeighborQueue> {
        let _timer = metrics::SEARCH_LATENCY.start_timer();
        metrics::SEARCH_COUNT.inc();

        let Some((entry, entry_level)) = view.entry_node() else {
            return Ok(NeighborQueue::new(top_k.max(1), Orientation::Min));
        };

        let mut num_visited = 0usize;
        let mut eps = [entry];
        for level in (1..=entry_level).rev() {
            let mut found = self.search_level(
                query,
                1,
                level,
                &eps,
                cursor,
                similarity,
                view,
                None,
                visit_limit.saturating_sub(num_visited),
            )?;
            num_visited += found.visited_count();
            if found.incomplete() {
                found.set_visited_count(num_visited);
                return Ok(found);
            }
            if let Some(best) = found.pop() {
                eps[0] = best.node;
            }
        }

        let mut results = self.search_level(
            query,
            top_k,
            0,
            &eps,
            cursor,
            similarity,
            view,
            accept,
            visit_limit.saturating_sub(num_visited),
        )?;
        results.set_visited_count(results.visited_count() + num_visited);
        Ok(results)
    }

    /// Beam search on a single level from the given entry points. `k` is
    /// both the result bound and the beam width.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search_level<C: VectorCursor + ?Sized>(
        &mut self,
        query: &VectorData,
        k: usize,
        level: usize,
        entry_points: &[u32],
        cursor: &mut C,
        similarity: Similarity,
        view: &GraphView<'_>,
        accept: Option<&dyn Bits>,
        visit_limit: usize,
    ) -> Result<NeighborQueue> {
        let mut results = NeighborQueue::new(k, Orientation::Min);
        let mut candidates = NeighborQueue::new(k, Orientation::Max);
        self.visited.clear();
        let mut num_visited = 0usize;

        for &ep in entry_points {
            if !self.visited.get_and_set(ep) {
                continue;
            }
            if num_visited >= visit_limit {
                results.mark_incomplete();
                break;
            }
            let score = similarity.compare(query.as_ref(), cursor.vector(ep)?)?;
            num_visited += 1;
            candidates.push(ep, score);
            if accept.map_or(true, |bits| bits.get(ep)) {
                results.insert_with_overflow(ep, score);
            }
        }

        // Once the result set is full, only frontier entries at least as
        // good as its worst member are worth expanding.
        let mut min_accepted = f32::NEG_INFINITY;
        if results.len() >= k
            && let Some(worst) = results.top_score()
        {
            min_accepted = worst;
        }

        while !results.incomplete() {
            let Some(candidate) = candidates.pop() else {
                break;
            };
            if candidate.score < min_accepted {
                break;
            }
            let Some(neighbors) = view.neighbor_snapshot(level, candidate.node) else {
                continue;
            };
            for entry in neighbors.entries() {
                let neighbor = entry.node;
                if !self.visited.get_and_set(neighbor) {
                    continue;
                }
                if num_visited >= visit_limit {
                    results.mark_incomplete();
                    break;
                }
                let score = similarity.compare(query.as_ref(), cursor.vector(neighbor)?)?;
                num_visited += 1;
                if score >= min_accepted {
                    candidates.push(neighbor, score);
                    if accept.map_or(true, |bits| bits.get(neighbor))
                        && results.insert_with_overflow(neighbor, score)
                        && results.len() >= k
                        && let Some(worst) = results.top_score()
                    {
                        min_accepted = worst;
                    }
                }
            }
        }

        if results.incomplete() {
            trace!(level, num_visited, visit_limit, "visit budget exhausted");
        }
        results.set_visited_count(num_visited);
        Ok(results)
    }
}

/// One-shot search with fresh scratch state. Prefer holding a
/// [`GraphSearcher`] per thread when searching repeatedly.
#[allow(clippy::too_many_arguments)]
pub fn search<C: VectorCursor + ?Sized>(
    query: &VectorData,
    top_k: usize,
    cursor: &mut C,
    similarity: Similarity,
    view: &GraphView<'_>,
    accept: Option<&dyn Bits>,
    visit_limit: usize,
) -> Result<NeighborQueue> {
    GraphSearcher::new().search(query, top_k, cursor, similarity, view, accept, visit_limit)
}
