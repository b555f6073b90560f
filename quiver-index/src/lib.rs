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

//! QuiverDB graph index.
//!
//! A concurrent in-memory Hierarchical Navigable Small World graph over a
//! [`quiver_core::VectorSource`]. Many writer threads extend the graph at
//! once; searches run against the live graph without locks.
//!
//! ## Concurrency model
//!
//! - **Node storage**: one sharded map per level; creating a node never
//!   touches another node's shard lock for long.
//! - **Neighbor lists**: immutable snapshots published by compare-and-swap;
//!   writers retry on contention, readers load and go. No per-node locks.
//! - **Entry point**: a packed atomic `(node, level)` cell with
//!   monotone-level promotion.
//!
//! ## Usage
//!
//! ```no_run
//! use quiver_core::{Similarity, SliceVectorSource, VectorData, VectorSource};
//! use quiver_index::{GraphBuilder, GraphSearcher, IndexConfig};
//!
//! # fn main() -> quiver_core::Result<()> {
//! let source = SliceVectorSource::from_f32(vec![vec![0.0, 1.0], vec![1.0, 0.0]])?;
//! let config = IndexConfig {
//!     max_connections: 16,
//!     beam_width: 100,
//!     similarity: Similarity::DotProduct,
//!     ..IndexConfig::default()
//! };
//! let builder = GraphBuilder::new(source.clone(), config)?;
//! let graph = builder.build(4)?;
//!
//! let mut searcher = GraphSearcher::new();
//! let results = searcher.search(
//!     &VectorData::F32(vec![0.5, 0.5]),
//!     10,
//!     &mut source.cursor(),
//!     Similarity::DotProduct,
//!     &graph.view(),
//!     None,
//!     usize::MAX,
//! )?;
//! println!("{:?}", results.nodes());
//! # Ok(())
//! # }
//! ```

pub mod builder;
mod entry_point;
pub mod graph;
pub mod metrics;
pub mod neighbor_queue;
pub mod neighbor_set;
pub mod searcher;

pub use builder::{GraphBuilder, IndexConfig};
pub use graph::{ConcurrentGraph, GraphStats, GraphView, NodesIterator};
pub use neighbor_queue::{NeighborQueue, Orientation, ScoredNode};
pub use neighbor_set::{ConcurrentNeighborSet, NeighborList, NodeScorer};
pub use searcher::{GraphSearcher, search};
