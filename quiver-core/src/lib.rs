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

//! QuiverDB core primitives.
//!
//! The pieces of the system that are not the graph engine itself: the
//! vector data model and similarity catalog, the random-access vector
//! provider traits, acceptance bitsets, and the shared error type. The
//! `quiver-index` crate builds the concurrent HNSW engine on top of this
//! surface.

pub mod bits;
pub mod error;
pub mod source;
pub mod vector;

pub use bits::{Bits, FixedBitSet};
pub use error::{QuiverError, Result};
pub use source::{SliceVectorSource, VectorCursor, VectorSource};
pub use vector::{Similarity, VectorData, VectorEncoding, VectorRef, l2_normalize};
