//! Distance metrics between feature vectors.

use serde::{Deserialize, Serialize};

use crate::error::{ImgsimError, Result};
use crate::feature::vector::FeatureVector;
use crate::util::simd;

/// Distance metrics used to re-rank candidates.
///
/// Every metric returns a non-negative value where smaller means more
/// similar; the re-ranker only relies on the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Manhattan (L1) distance
    Manhattan,
    /// Euclidean (L2) distance
    #[default]
    Euclidean,
    /// Cosine distance (1 - cosine similarity)
    Cosine,
    /// Tanimoto distance, common for fuzzy color/texture histograms
    Tanimoto,
}

impl DistanceMetric {
    /// Calculate the distance between two vectors using this metric.
    pub fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> Result<f64> {
        if a.len() != b.len() {
            return Err(ImgsimError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }

        if let (Some(a), Some(b)) = (a.as_f64_slice(), b.as_f64_slice()) {
            return Ok(self.distance_slices(a, b));
        }

        let result = match self {
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Euclidean => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f64>()
                .sqrt(),
            DistanceMetric::Cosine => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                cosine_distance(dot, norm_a, norm_b)
            }
            DistanceMetric::Tanimoto => {
                let (mut dot, mut norm_a, mut norm_b) = (0.0, 0.0, 0.0);
                for (x, y) in a.iter().zip(b.iter()) {
                    dot += x * y;
                    norm_a += x * x;
                    norm_b += y * y;
                }
                tanimoto_distance(dot, norm_a, norm_b)
            }
        };

        Ok(result)
    }

    fn distance_slices(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            DistanceMetric::Manhattan => a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum(),
            DistanceMetric::Euclidean => simd::squared_distance(a, b).sqrt(),
            DistanceMetric::Cosine => cosine_distance(
                simd::dot_product(a, b),
                simd::dot_product(a, a),
                simd::dot_product(b, b),
            ),
            DistanceMetric::Tanimoto => tanimoto_distance(
                simd::dot_product(a, b),
                simd::dot_product(a, a),
                simd::dot_product(b, b),
            ),
        }
    }

    /// Get the name of this distance metric.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Manhattan => "manhattan",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Tanimoto => "tanimoto",
        }
    }

    /// Parse a distance metric from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "manhattan" | "l1" => Ok(DistanceMetric::Manhattan),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            "tanimoto" => Ok(DistanceMetric::Tanimoto),
            _ => Err(ImgsimError::invalid_argument(format!(
                "Unknown distance metric: {s}"
            ))),
        }
    }
}

fn cosine_distance(dot: f64, norm_a_sq: f64, norm_b_sq: f64) -> f64 {
    if norm_a_sq == 0.0 || norm_b_sq == 0.0 {
        return 1.0; // Maximum distance for zero vectors
    }
    // Rounding can push the similarity a hair above 1.
    (1.0 - dot / (norm_a_sq.sqrt() * norm_b_sq.sqrt())).max(0.0)
}

fn tanimoto_distance(dot: f64, norm_a_sq: f64, norm_b_sq: f64) -> f64 {
    let denominator = norm_a_sq + norm_b_sq - dot;
    if denominator == 0.0 {
        return 0.0; // Both vectors are zero
    }
    (1.0 - dot / denominator).max(0.0)
}
