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

//! Vector provider abstraction.
//!
//! A [`VectorSource`] is a random-access corpus of fixed-dimension vectors
//! addressed by dense ordinals. Because a source is shared by many build and
//! search threads, all per-thread state lives in a [`VectorCursor`] obtained
//! via [`VectorSource::cursor`]; a cursor is cheap, single-threaded, and
//! never shared.

use std::sync::Arc;

use crate::error::{QuiverError, Result};
use crate::vector::{VectorData, VectorEncoding, VectorRef};

/// Shared, thread-safe handle to a vector corpus.
pub trait VectorSource: Send + Sync {
    type Cursor: VectorCursor + Send;

    /// Number of vectors in the corpus.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimensionality shared by every vector.
    fn dimension(&self) -> usize;

    fn encoding(&self) -> VectorEncoding;

    /// A fresh thread-local cursor over this corpus.
    fn cursor(&self) -> Self::Cursor;
}

/// Single-threaded random-access reader over a [`VectorSource`].
pub trait VectorCursor {
    /// Borrow the vector at `ord`. The borrow is released on the next call.
    fn vector(&mut self, ord: u32) -> Result<VectorRef<'_>>;

    /// Copy the vector at `ord` out of the cursor.
    fn fetch(&mut self, ord: u32) -> Result<VectorData> {
        Ok(self.vector(ord)?.to_owned())
    }
}

/// In-memory vector source backed by a shared slice of rows.
#[derive(Clone)]
pub struct SliceVectorSource {
    vectors: Arc<Vec<VectorData>>,
    dimension: usize,
    encoding: VectorEncoding,
}

impl SliceVectorSource {
    pub fn from_f32(rows: Vec<Vec<f32>>) -> Result<Self> {
        Self::new(rows.into_iter().map(VectorData::F32).collect())
    }

    pub fn from_i8(rows: Vec<Vec<i8>>) -> Result<Self> {
        Self::new(rows.into_iter().map(VectorData::I8).collect())
    }

    pub fn new(vectors: Vec<VectorData>) -> Result<Self> {
        let first = vectors
            .first()
            .ok_or_else(|| QuiverError::InvalidArgument("empty vector source".to_string()))?;
        let dimension = first.dimension();
        let encoding = first.encoding();
        if dimension == 0 {
            return Err(QuiverError::InvalidArgument(
                "zero-dimension vectors".to_string(),
            ));
        }
        for (ord, v) in vectors.iter().enumerate() {
            if v.dimension() != dimension || v.encoding() != encoding {
                return Err(QuiverError::InvalidArgument(format!(
                    "vector {ord} does not match corpus shape ({dimension} dims, {encoding:?})"
                )));
            }
        }
        Ok(Self {
            vectors: Arc::new(vectors),
            dimension,
            encoding,
        })
    }
}

impl VectorSource for SliceVectorSource {
    type Cursor = SliceVectorSource;

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encoding(&self) -> VectorEncoding {
        self.encoding
    }

    fn cursor(&self) -> Self::Cursor {
        self.clone()
    }
}

impl VectorCursor for SliceVectorSource {
    fn vector(&mut self, ord: u32) -> Result<VectorRef<'_>> {
        self.vectors
            .get(ord as usize)
            .map(VectorData::as_ref)
            .ok_or_else(|| {
                QuiverError::InvalidArgument(format!(
                    "ordinal {ord} out of range (corpus holds {})",
                    self.vectors.len()
                ))
            })
    }
}
