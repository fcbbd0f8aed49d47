// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Vector similarity used by embedding-based metrics

/// Numerical stability constant
pub const EPSILON: f64 = 1e-10;

/// Compute cosine similarity between two vectors with numerical stability
///
/// # Returns
/// Similarity in range [-1, 1], or `None` when the vectors are empty,
/// of different dimensionality, or (near) zero
///
/// # Example
/// ```
/// use ragscore_evals::metrics::formulas::cosine_similarity;
///
/// let a = vec![1.0, 0.0];
/// let b = vec![0.0, 1.0];
/// assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-10);
/// ```
#[inline]
pub fn cosine_similarity(vec_a: &[f64], vec_b: &[f64]) -> Option<f64> {
    if vec_a.len() != vec_b.len() || vec_a.is_empty() {
        return None;
    }

    let dot_product: f64 = vec_a.iter().zip(vec_b.iter()).map(|(a, b)| a * b).sum();
    let norm_a: f64 = vec_a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = vec_b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < EPSILON || norm_b < EPSILON {
        return None;
    }

    Some((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

/// Mean cosine similarity of `query` against each of `documents`.
///
/// `None` when there is nothing to compare against or any pair is
/// degenerate (mismatched dimensions, empty or zero vectors).
pub fn mean_cosine_similarity(query: &[f64], documents: &[Vec<f64>]) -> Option<f64> {
    if documents.is_empty() {
        return None;
    }

    let mut total = 0.0;
    for doc in documents {
        total += cosine_similarity(query, doc)?;
    }
    Some(total / documents.len() as f64)
}
