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

//! Vector data model and similarity catalog.
//!
//! Vectors come in two encodings, full-precision `f32` and quantized `i8`.
//! Rather than a type hierarchy, both are carried through a pair of sum
//! types: [`VectorData`] for owned values and [`VectorRef`] for borrowed
//! slices handed out by a provider cursor. All similarity kernels score in
//! "higher is more similar" orientation so that ranking code never needs to
//! know which metric is in play.

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// Storage encoding of a vector corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorEncoding {
    /// One `i8` per dimension.
    Byte,
    /// One `f32` per dimension.
    Float32,
}

/// An owned vector in either encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    F32(Vec<f32>),
    I8(Vec<i8>),
}

impl VectorData {
    pub fn encoding(&self) -> VectorEncoding {
        match self {
            VectorData::F32(_) => VectorEncoding::Float32,
            VectorData::I8(_) => VectorEncoding::Byte,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorData::F32(v) => v.len(),
            VectorData::I8(v) => v.len(),
        }
    }

    pub fn as_ref(&self) -> VectorRef<'_> {
        match self {
            VectorData::F32(v) => VectorRef::F32(v),
            VectorData::I8(v) => VectorRef::I8(v),
        }
    }
}

/// A borrowed vector slice in either encoding.
#[derive(Debug, Clone, Copy)]
pub enum VectorRef<'a> {
    F32(&'a [f32]),
    I8(&'a [i8]),
}

impl<'a> VectorRef<'a> {
    pub fn encoding(&self) -> VectorEncoding {
        match self {
            VectorRef::F32(_) => VectorEncoding::Float32,
            VectorRef::I8(_) => VectorEncoding::Byte,
        }
    }

    pub fn dimension(&self) -> usize {
        match self {
            VectorRef::F32(v) => v.len(),
            VectorRef::I8(v) => v.len(),
        }
    }

    pub fn to_owned(&self) -> VectorData {
        match self {
            VectorRef::F32(v) => VectorData::F32(v.to_vec()),
            VectorRef::I8(v) => VectorData::I8(v.to_vec()),
        }
    }
}

/// Similarity function catalog.
///
/// Every function maps a pair of vectors to a score where higher means more
/// similar. Distances are folded into scores with the usual normalizations
/// (`1/(1+d²)` for euclidean, `(1+x)/2` for the cosine-family metrics) so
/// that all scores are directly comparable inside one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Similarity {
    DotProduct,
    Euclidean,
    Cosine,
}

impl Similarity {
    /// Score a pair of vectors. Fails on encoding or dimension mismatch.
    pub fn compare(&self, a: VectorRef<'_>, b: VectorRef<'_>) -> Result<f32> {
        match (a, b) {
            (VectorRef::F32(a), VectorRef::F32(b)) => {
                check_dims(a.len(), b.len())?;
                Ok(match self {
                    Similarity::DotProduct => (1.0 + dot_f32(a, b)) / 2.0,
                    Similarity::Euclidean => 1.0 / (1.0 + squared_l2_f32(a, b)),
                    Similarity::Cosine => (1.0 + cosine_f32(a, b)) / 2.0,
                })
            }
            (VectorRef::I8(a), VectorRef::I8(b)) => {
                check_dims(a.len(), b.len())?;
                Ok(match self {
                    // Byte dot products are bounded by 127² per dimension;
                    // scale into [0, 1] the way the full-precision variant is.
                    Similarity::DotProduct => {
                        0.5 + dot_i8(a, b) as f32 / (a.len() * (1 << 15)) as f32
                    }
                    Similarity::Euclidean => 1.0 / (1.0 + squared_l2_i8(a, b) as f32),
                    Similarity::Cosine => (1.0 + cosine_i8(a, b)) / 2.0,
                })
            }
            _ => Err(QuiverError::InvalidArgument(format!(
                "vector encoding mismatch: {:?} vs {:?}",
                a.encoding(),
                b.encoding()
            ))),
        }
    }
}

fn check_dims(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(QuiverError::InvalidArgument(format!(
            "vector dimension mismatch: {a} vs {b}"
        )));
    }
    Ok(())
}

fn dot_f32(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn squared_l2_f32(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn cosine_f32(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn dot_i8(a: &[i8], b: &[i8]) -> i32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x as i32 * y as i32)
        .sum()
}

fn squared_l2_i8(a: &[i8], b: &[i8]) -> i32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            d * d
        })
        .sum()
}

fn cosine_i8(a: &[i8], b: &[i8]) -> f32 {
    let dot = dot_i8(a, b) as f32;
    let norm_a = dot_i8(a, a) as f32;
    let norm_b = dot_i8(b, b) as f32;
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Normalize a float vector to unit length in place. No-op on the zero
/// vector.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_product_orientation() {
        let a = VectorRef::F32(&[1.0, 0.0]);
        let b = VectorRef::F32(&[1.0, 0.0]);
        let c = VectorRef::F32(&[-1.0, 0.0]);
        let same = Similarity::DotProduct.compare(a, b).unwrap();
        let opposite = Similarity::DotProduct.compare(a, c).unwrap();
        assert_eq!(same, 1.0);
        assert_eq!(opposite, 0.0);
        assert!(same > opposite);
    }

    #[test]
    fn euclidean_closer_scores_higher() {
        let origin = VectorRef::F32(&[0.0, 0.0, 0.0]);
        let near = VectorRef::F32(&[0.0, 1.0, 0.0]);
        let far = VectorRef::F32(&[0.0, 10.0, 0.0]);
        let s_near = Similarity::Euclidean.compare(origin, near).unwrap();
        let s_far = Similarity::Euclidean.compare(origin, far).unwrap();
        assert!(s_near > s_far);
        assert_eq!(s_far, 1.0 / 101.0);
    }

    #[test]
    fn byte_vectors_score() {
        let a = VectorRef::I8(&[127, 0]);
        let b = VectorRef::I8(&[127, 0]);
        let s = Similarity::DotProduct.compare(a, b).unwrap();
        assert!(s > 0.5);
        let e = Similarity::Euclidean.compare(a, b).unwrap();
        assert_eq!(e, 1.0);
    }

    #[test]
    fn mismatches_are_rejected() {
        let a = VectorRef::F32(&[1.0, 0.0]);
        let b = VectorRef::F32(&[1.0, 0.0, 0.0]);
        assert!(Similarity::DotProduct.compare(a, b).is_err());
        let c = VectorRef::I8(&[1, 0]);
        assert!(Similarity::DotProduct.compare(a, c).is_err());
    }

    #[test]
    fn normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
