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

//! Concurrent graph construction.
//!
//! One insertion is: draw a level from the geometric distribution, create
//! the node's neighbor slots, greedily descend from the entry point to just
//! above the node's top level, then beam-search each level on the way down,
//! linking the node to a diverse subset of what the beam found and
//! reciprocally offering the node to each chosen neighbor. A node whose
//! level exceeds the entry level promotes itself afterwards.
//!
//! Parallel builds run the same insertion on a scope of worker threads that
//! pull ordinals off a shared atomic counter, each with its own provider
//! cursor. Workers never block on each other: all shared mutation goes
//! through the neighbor sets' compare-and-swap publication and the packed
//! entry-point cell. Insertions racing with entry promotion or neighbor
//! updates simply observe some published state and proceed; the diversity
//! rule is re-applied on every publication, so interleavings change tie
//! winners but not the structural invariants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::collections::BTreeMap;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use quiver_core::{
    QuiverError, Result, Similarity, VectorCursor, VectorSource,
};

use crate::graph::ConcurrentGraph;
use crate::metrics;
use crate::neighbor_queue::ScoredNode;
use crate::neighbor_set::NodeScorer;
use crate::searcher::GraphSearcher;

/// Construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Max connections per node on levels >= 1; the base layer allows twice
    /// as many.
    pub max_connections: usize,
    /// Candidate-list size during insertion search.
    pub beam_width: usize,
    pub similarity: Similarity,
    /// Seed for level assignment. A fixed seed makes single-threaded
    /// builds deterministic.
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_connections: 16,
            beam_width: 100,
            similarity: Similarity::DotProduct,
            seed: 42,
        }
    }
}

/// Pairwise scorer backed by a provider cursor: fetches one side, borrows
/// the other.
struct CursorScorer<'a, C: VectorCursor + ?Sized> {
    cursor: &'a mut C,
    similarity: Similarity,
}

impl<C: VectorCursor + ?Sized> NodeScorer for CursorScorer<'_, C> {
    fn score(&mut self, a: u32, b: u32) -> Result<f32> {
        let va = self.cursor.fetch(a)?;
        let vb = self.cursor.vector(b)?;
        self.similarity.compare(va.as_ref(), vb)
    }
}

pub struct GraphBuilder<S: VectorSource> {
    source: S,
    config: IndexConfig,
    graph: Arc<ConcurrentGraph>,
    /// Level normalization factor, `1/ln(M)` (1 when `M == 1`).
    ml: f64,
    rng: Mutex<SmallRng>,
    cancelled: AtomicBool,
}

impl<S: VectorSource> GraphBuilder<S> {
    pub fn new(source: S, config: IndexConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(QuiverError::InvalidArgument(
                "max_connections must be positive".to_string(),
            ));
        }
        if config.beam_width == 0 {
            return Err(QuiverError::InvalidArgument(
                "beam_width must be positive".to_string(),
            ));
        }
        if source.dimension() == 0 {
            return Err(QuiverError::InvalidArgument(
                "vector source must have a positive dimension".to_string(),
            ));
        }
        let ml = if config.max_connections == 1 {
            1.0
        } else {
            1.0 / (config.max_connections as f64).ln()
        };
        Ok(Self {
            graph: Arc::new(ConcurrentGraph::new(config.max_connections)),
            rng: Mutex::new(SmallRng::seed_from_u64(config.seed)),
            cancelled: AtomicBool::new(false),
            source,
            config,
            ml,
        })
    }

    /// Start from an existing graph whose node ids are remapped through
    /// `ord_map` (old ordinal -> new ordinal). The map must be injective
    /// and monotone; arcs are carried over re-scored against the new
    /// source, and the initializer's entry point is installed. Ordinals
    /// already present are skipped by subsequent [`GraphBuilder::build`]
    /// calls, so building after initialization inserts only the new nodes.
    pub fn from_initializer(
        source: S,
        config: IndexConfig,
        initializer: &ConcurrentGraph,
        ord_map: &BTreeMap<u32, u32>,
    ) -> Result<Self> {
        let builder = Self::new(source, config)?;

        let mut prev: Option<u32> = None;
        for &new in ord_map.values() {
            if let Some(p) = prev
                && new <= p
            {
                return Err(QuiverError::InvalidArgument(
                    "ordinal map must be injective and monotone".to_string(),
                ));
            }
            prev = Some(new);
        }
        let map_ord = |old: u32| -> Result<u32> {
            ord_map.get(&old).copied().ok_or_else(|| {
                QuiverError::InvalidArgument(format!("ordinal {old} missing from ordinal map"))
            })
        };

        for level in 0..initializer.num_levels() {
            for old in initializer.nodes_on_level(level) {
                builder.graph.add_node(level, map_ord(old)?);
            }
        }

        let mut cursor = builder.source.cursor();
        for level in 0..initializer.num_levels() {
            for old in initializer.nodes_on_level(level) {
                let new = map_ord(old)?;
                let Some(old_set) = initializer.neighbors(level, old) else {
                    continue;
                };
                let new_set = builder.graph.neighbors(level, new).ok_or_else(|| {
                    QuiverError::Internal(format!("missing slot for node {new} at level {level}"))
                })?;
                let owner = cursor.fetch(new)?;
                let mut entries = Vec::with_capacity(old_set.len());
                for arc in old_set.snapshot().entries() {
                    let mapped = map_ord(arc.node)?;
                    let score = builder
                        .config
                        .similarity
                        .compare(owner.as_ref(), cursor.vector(mapped)?)?;
                    entries.push(ScoredNode {
                        node: mapped,
                        score,
                    });
                }
                new_set.seed(entries);
            }
        }

        if let Some((entry, level)) = initializer.entry_node() {
            builder.graph.try_set_initial_entry(map_ord(entry)?, level);
        }
        Ok(builder)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Shared handle to the graph under construction. Searches may run
    /// against it concurrently with insertion.
    pub fn graph(&self) -> Arc<ConcurrentGraph> {
        Arc::clone(&self.graph)
    }

    /// Request cancellation of an in-flight [`GraphBuilder::build`].
    /// Workers observe the flag between node insertions.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Insert one node. Returns the estimated heap bytes the insertion
    /// added, for incremental RAM accounting; re-inserting a present
    /// ordinal is a no-op reported as zero bytes.
    pub fn add_graph_node(&self, node: u32, cursor: &mut S::Cursor) -> Result<usize> {
        let _timer = metrics::INSERT_LATENCY.start_timer();
        metrics::INSERT_COUNT.inc();

        if self.graph.neighbors(0, node).is_some() {
            return Ok(0);
        }
        let query = cursor.fetch(node)?;
        let node_level = self.assign_level();
        for level in 0..=node_level {
            self.graph.add_node(level, node);
        }
        let bytes: usize = (0..=node_level).map(|l| self.graph.slot_bytes(l)).sum();

        if self.graph.try_set_initial_entry(node, node_level) {
            trace!(node, level = node_level, "installed initial entry point");
            return Ok(bytes);
        }
        let (entry, entry_level) = self.graph.entry_node().ok_or_else(|| {
            QuiverError::Internal("entry point absent in a non-empty graph".to_string())
        })?;

        let view = self.graph.view();
        let mut searcher = GraphSearcher::new();

        // Greedy top-1 descent through the levels above this node.
        let mut eps: Vec<u32> = vec![entry];
        for level in (node_level + 1..=entry_level).rev() {
            let mut found = searcher.search_level(
                &query,
                1,
                level,
                &eps,
                cursor,
                self.config.similarity,
                &view,
                None,
                usize::MAX,
            )?;
            if let Some(best) = found.pop() {
                eps[0] = best.node;
            }
        }

        // Beam search each level the node joins, link diversely, and offer
        // the node back to every linked neighbor. The next level down is
        // seeded with this level's full candidate set.
        for level in (0..=node_level.min(entry_level)).rev() {
            let found = searcher.search_level(
                &query,
                self.config.beam_width,
                level,
                &eps,
                cursor,
                self.config.similarity,
                &view,
                None,
                usize::MAX,
            )?;
            let candidates = found.scored_nodes();

            let set = self.graph.neighbors(level, node).ok_or_else(|| {
                QuiverError::Internal(format!("missing slot for node {node} at level {level}"))
            })?;
            let mut scorer = CursorScorer {
                cursor: &mut *cursor,
                similarity: self.config.similarity,
            };
            set.insert_diverse(&candidates, &mut scorer)?;
            for member in set.snapshot().entries() {
                if let Some(neighbor_set) = self.graph.neighbors(level, member.node) {
                    neighbor_set.insert_not_diverse(node, member.score, &mut scorer)?;
                }
            }

            if !candidates.is_empty() {
                eps = candidates.iter().map(|c| c.node).collect();
            }
        }

        if node_level > entry_level && self.graph.try_promote_entry(node, node_level) {
            trace!(node, level = node_level, "promoted entry point");
        }
        Ok(bytes)
    }

    /// Insert every ordinal of the source using `parallelism` worker
    /// threads pulling work off a shared counter. Returns the graph when
    /// all insertions are done, `Cancelled` if [`GraphBuilder::cancel`]
    /// fired, or the first insertion error otherwise.
    pub fn build(&self, parallelism: usize) -> Result<Arc<ConcurrentGraph>> {
        if parallelism == 0 {
            return Err(QuiverError::InvalidArgument(
                "parallelism must be positive".to_string(),
            ));
        }
        let total = self.source.len();
        debug!(total, parallelism, "building graph");

        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let failure: Mutex<Option<QuiverError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..parallelism {
                scope.spawn(|| {
                    let mut cursor = self.source.cursor();
                    loop {
                        if self.cancelled.load(Ordering::Acquire) || failed.load(Ordering::Acquire)
                        {
                            return;
                        }
                        let node = next.fetch_add(1, Ordering::Relaxed);
                        if node >= total {
                            return;
                        }
                        if let Err(e) = self.add_graph_node(node as u32, &mut cursor) {
                            let mut slot = failure.lock();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            failed.store(true, Ordering::Release);
                            return;
                        }
                    }
                });
            }
        });

        if self.cancelled.load(Ordering::Acquire) {
            return Err(QuiverError::Cancelled);
        }
        if let Some(e) = failure.lock().take() {
            return Err(e);
        }
        debug!(
            size = self.graph.size(),
            levels = self.graph.num_levels(),
            "graph build complete"
        );
        Ok(Arc::clone(&self.graph))
    }

    /// Draw a node's top level: `floor(-ln(U) * ml)` with `U` uniform in
    /// (0, 1].
    fn assign_level(&self) -> usize {
        let mut rng = self.rng.lock();
        let unit: f64 = loop {
            let u: f64 = rng.r#gen();
            if u > 0.0 {
                break u;
            }
        };
        (-unit.ln() * self.ml) as usize
    }
}
