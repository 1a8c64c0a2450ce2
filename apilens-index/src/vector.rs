// Copyright 2025 AgentReplay (https://github.com/agentreplay)
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

//! Dense vector helpers.

use crate::error::{IndexError, Result};
use ndarray::ArrayView1;

/// A dense embedding vector.
pub type Embedding = Vec<f32>;

/// Euclidean (L2) norm.
pub fn magnitude(v: &[f32]) -> f32 {
    let view = ArrayView1::from(v);
    view.dot(&view).sqrt()
}

/// Scale `v` to unit length in place. A zero vector is left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = magnitude(v);
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0 when either vector has zero magnitude. Vectors of different
/// lengths are a caller bug and yield [`IndexError::DimensionMismatch`].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(IndexError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let va = ArrayView1::from(a);
    let vb = ArrayView1::from(b);
    let denom = va.dot(&va).sqrt() * vb.dot(&vb).sqrt();
    if denom == 0.0 {
        return Ok(0.0);
    }

    Ok(va.dot(&vb) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magnitude() {
        assert!((magnitude(&[3.0, 4.0]) - 5.0).abs() < 1e-6);
        assert_eq!(magnitude(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![1.0, 2.0, 2.0];
        l2_normalize(&mut v);
        assert!((magnitude(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_stays_zero() {
        let mut v = vec![0.0; 4];
        l2_normalize(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
        assert!(v.iter().all(|x| !x.is_nan()));
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        let a = [1.0, 0.0, 1.0];
        let b = [0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = [1.0, 2.0];
        let b = [-1.0, -2.0];
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_magnitude_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch() {
        let err = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).unwrap_err();
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
