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

//! Layered concurrent graph.
//!
//! Level 0 holds every inserted node; upper levels hold sparser subsets.
//! Each level is a sharded map from node id to that node's
//! [`ConcurrentNeighborSet`], so node creation and neighbor updates on
//! different nodes never contend on a common lock. The level vector itself
//! grows under a rarely-taken write lock.
//!
//! `add_node` is idempotent and order-insensitive: the same structure comes
//! out whether levels are populated bottom-up, top-down, or shuffled, which
//! keeps concurrent insertion and graph initialization simple. `num_levels`
//! is derived from occupancy, not from the entry point, so a graph
//! assembled without a builder still reports correctly.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use quiver_core::{QuiverError, Result};

use crate::entry_point::EntryPoint;
use crate::neighbor_set::{ConcurrentNeighborSet, NeighborList};

type LevelMap = DashMap<u32, Arc<ConcurrentNeighborSet>>;

/// Fixed per-slot overhead charged on top of each neighbor set when
/// estimating RAM: the map entry, the `Arc`, and shard bookkeeping.
const SLOT_OVERHEAD_BYTES: usize = 48;

pub struct ConcurrentGraph {
    max_connections: usize,
    levels: RwLock<Vec<Arc<LevelMap>>>,
    entry: EntryPoint,
}

impl ConcurrentGraph {
    pub fn new(max_connections: usize) -> Self {
        assert!(max_connections > 0, "max_connections must be positive");
        Self {
            max_connections,
            levels: RwLock::new(Vec::new()),
            entry: EntryPoint::new(),
        }
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Neighbor capacity on `level`: the base layer allows twice as many
    /// connections as the upper layers.
    pub fn capacity_for(&self, level: usize) -> usize {
        if level == 0 {
            self.max_connections * 2
        } else {
            self.max_connections
        }
    }

    /// Create the neighbor slot for `node` at `level` if it does not exist
    /// yet. Safe to call in any order across levels and nodes; returns
    /// whether the slot was newly created.
    pub fn add_node(&self, level: usize, node: u32) -> bool {
        let map = self.level_map(level);
        let mut created = false;
        map.entry(node).or_insert_with(|| {
            created = true;
            Arc::new(ConcurrentNeighborSet::new(node, self.capacity_for(level)))
        });
        created
    }

    /// The neighbor set of `node` at `level`, if present.
    pub fn neighbors(&self, level: usize, node: u32) -> Option<Arc<ConcurrentNeighborSet>> {
        let levels = self.levels.read();
        let map = levels.get(level)?;
        map.get(&node).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of nodes on the base layer.
    pub fn size(&self) -> usize {
        self.levels.read().first().map_or(0, |m| m.len())
    }

    /// One more than the highest non-empty level; 0 for an empty graph.
    pub fn num_levels(&self) -> usize {
        let levels = self.levels.read();
        for (level, map) in levels.iter().enumerate().rev() {
            if !map.is_empty() {
                return level + 1;
            }
        }
        0
    }

    /// Snapshot iterator over the node ids on `level`. Order is
    /// unspecified but fixed for the iterator's lifetime.
    pub fn nodes_on_level(&self, level: usize) -> NodesIterator {
        let nodes: Vec<u32> = {
            let levels = self.levels.read();
            match levels.get(level) {
                Some(map) => map.iter().map(|entry| *entry.key()).collect(),
                None => Vec::new(),
            }
        };
        NodesIterator::new(nodes)
    }

    /// Current `(node, level)` entry point; `None` before the first insert.
    pub fn entry_node(&self) -> Option<(u32, usize)> {
        self.entry.load()
    }

    /// Install the entry point for the very first node. Fails if an entry
    /// point already exists.
    pub fn try_set_initial_entry(&self, node: u32, level: usize) -> bool {
        self.entry.set_first(node, level)
    }

    /// Promote the entry point iff `level` exceeds the current entry level.
    pub fn try_promote_entry(&self, node: u32, level: usize) -> bool {
        self.entry.try_promote(node, level)
    }

    /// A read view for one reader thread.
    pub fn view(&self) -> GraphView<'_> {
        GraphView {
            graph: self,
            cursor: None,
        }
    }

    /// Estimated heap bytes for the whole graph, consistent with the
    /// incremental per-insert estimates the builder reports.
    pub fn ram_bytes_used(&self) -> usize {
        let levels = self.levels.read();
        let mut total = std::mem::size_of::<Self>();
        for (level, map) in levels.iter().enumerate() {
            total += std::mem::size_of::<LevelMap>();
            total += map.len() * self.slot_bytes(level);
        }
        total
    }

    /// Estimated heap bytes one node occupies on `level`.
    pub(crate) fn slot_bytes(&self, level: usize) -> usize {
        SLOT_OVERHEAD_BYTES + ConcurrentNeighborSet::ram_bytes_estimate(self.capacity_for(level))
    }

    /// Aggregate structural statistics.
    pub fn stats(&self) -> GraphStats {
        let size = self.size();
        let num_levels = self.num_levels();
        let mut total_degree = 0usize;
        if num_levels > 0 {
            let levels = self.levels.read();
            if let Some(base) = levels.first() {
                for entry in base.iter() {
                    total_degree += entry.value().len();
                }
            }
        }
        GraphStats {
            size,
            num_levels,
            avg_degree: if size == 0 {
                0.0
            } else {
                total_degree as f32 / size as f32
            },
            ram_bytes: self.ram_bytes_used(),
        }
    }

    /// Diagnostic sweep over the published structure: no self-loops, no
    /// duplicate arcs, degrees within capacity, upper-level nodes present
    /// on every level below, arcs pointing at nodes that exist on the same
    /// level.
    pub fn validate(&self) -> Result<()> {
        let levels: Vec<Arc<LevelMap>> = self.levels.read().clone();
        for (level, map) in levels.iter().enumerate() {
            for entry in map.iter() {
                let node = *entry.key();
                if level > 0 {
                    for lower in 0..level {
                        if !levels[lower].contains_key(&node) {
                            return Err(QuiverError::Internal(format!(
                                "node {node} on level {level} missing from level {lower}"
                            )));
                        }
                    }
                }
                let snapshot = entry.value().snapshot();
                if snapshot.len() > self.capacity_for(level) {
                    return Err(QuiverError::Internal(format!(
                        "node {node} on level {level} exceeds capacity: {}",
                        snapshot.len()
                    )));
                }
                let mut seen: Vec<u32> = Vec::with_capacity(snapshot.len());
                for neighbor in snapshot.nodes() {
                    if neighbor == node {
                        return Err(QuiverError::Internal(format!(
                            "self-loop on node {node} at level {level}"
                        )));
                    }
                    if seen.contains(&neighbor) {
                        return Err(QuiverError::Internal(format!(
                            "duplicate arc {node} -> {neighbor} at level {level}"
                        )));
                    }
                    if !map.contains_key(&neighbor) {
                        return Err(QuiverError::Internal(format!(
                            "arc {node} -> {neighbor} at level {level} points outside the level"
                        )));
                    }
                    seen.push(neighbor);
                }
            }
        }
        Ok(())
    }

    fn level_map(&self, level: usize) -> Arc<LevelMap> {
        {
            let levels = self.levels.read();
            if let Some(map) = levels.get(level) {
                return Arc::clone(map);
            }
        }
        let mut levels = self.levels.write();
        while levels.len() <= level {
            levels.push(Arc::new(DashMap::new()));
        }
        Arc::clone(&levels[level])
    }
}

/// Structural statistics snapshot.
#[derive(Debug, Clone)]
pub struct GraphStats {
    pub size: usize,
    pub num_levels: usize,
    pub avg_degree: f32,
    pub ram_bytes: usize,
}

/// Finite snapshot iterator over the nodes of one level.
pub struct NodesIterator {
    nodes: Vec<u32>,
    position: usize,
}

impl NodesIterator {
    fn new(nodes: Vec<u32>) -> Self {
        Self { nodes, position: 0 }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Iterator for NodesIterator {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let next = self.nodes.get(self.position).copied();
        self.position += 1;
        next
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.nodes.len() - self.position.min(self.nodes.len());
        (remaining, Some(remaining))
    }
}

/// Stateful single-threaded read cursor over a shared graph.
///
/// Neighbor access comes in two shapes: [`GraphView::neighbor_snapshot`]
/// hands back the whole published list at once, and the
/// `seek`/`next_neighbor` pair iterates the same snapshot one id at a
/// time. Each reader thread gets its own view; the underlying graph may be
/// mutated concurrently and every read observes some fully-published list.
pub struct GraphView<'g> {
    graph: &'g ConcurrentGraph,
    cursor: Option<(Arc<NeighborList>, usize)>,
}

impl<'g> GraphView<'g> {
    pub fn graph(&self) -> &'g ConcurrentGraph {
        self.graph
    }

    /// The published neighbor list of `node` at `level`, or `None` when the
    /// slot does not exist.
    pub fn neighbor_snapshot(&self, level: usize, node: u32) -> Option<Arc<NeighborList>> {
        self.graph.neighbors(level, node).map(|set| set.snapshot())
    }

    /// Position the cursor on `node`'s neighbors at `level`.
    pub fn seek(&mut self, level: usize, node: u32) -> Result<()> {
        match self.neighbor_snapshot(level, node) {
            Some(list) => {
                self.cursor = Some((list, 0));
                Ok(())
            }
            None => Err(QuiverError::InvalidArgument(format!(
                "no node {node} at level {level}"
            ))),
        }
    }

    /// Next neighbor id at the seeked position, or `None` when exhausted
    /// (or before any `seek`).
    pub fn next_neighbor(&mut self) -> Option<u32> {
        let (list, position) = self.cursor.as_mut()?;
        let next = list.entries().get(*position).map(|e| e.node);
        *position += 1;
        next
    }

    pub fn size(&self) -> usize {
        self.graph.size()
    }

    pub fn num_levels(&self) -> usize {
        self.graph.num_levels()
    }

    pub fn entry_node(&self) -> Option<(u32, usize)> {
        self.graph.entry_node()
    }

    pub fn nodes_on_level(&self, level: usize) -> NodesIterator {
        self.graph.nodes_on_level(level)
    }
}
