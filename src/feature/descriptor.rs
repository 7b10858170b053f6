//! Feature type descriptors and index field naming.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::feature::distance::DistanceMetric;
use crate::feature::vector::{FeatureVector, VectorKind};

/// Suffix of the field holding the encoded histogram.
pub const HISTOGRAM_FIELD_SUFFIX: &str = "_hi";
/// Suffix of the field holding BitSampling hash terms.
pub const HASH_FIELD_SUFFIX: &str = "_ha";
/// Suffix of the field holding MetricSpaces reference point terms.
pub const METRIC_SPACES_FIELD_SUFFIX: &str = "_ms";

/// Name of the histogram field for a feature code.
pub fn histogram_field(code: &str) -> String {
    format!("{code}{HISTOGRAM_FIELD_SUFFIX}")
}

/// Name of the BitSampling hash field for a feature code.
pub fn hash_field(code: &str) -> String {
    format!("{code}{HASH_FIELD_SUFFIX}")
}

/// Name of the MetricSpaces field for a feature code.
pub fn metric_spaces_field(code: &str) -> String {
    format!("{code}{METRIC_SPACES_FIELD_SUFFIX}")
}

/// Describes one global feature type: how its vectors are stored and compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureDescriptor {
    code: String,
    name: String,
    kind: VectorKind,
    metric: DistanceMetric,
}

impl FeatureDescriptor {
    pub fn new<C, N>(code: C, name: N, kind: VectorKind, metric: DistanceMetric) -> Self
    where
        C: Into<String>,
        N: Into<String>,
    {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            metric,
        }
    }

    /// Short code, e.g. `cl`.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Human readable feature name, e.g. `ColorLayout`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> VectorKind {
        self.kind
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn histogram_field(&self) -> String {
        histogram_field(&self.code)
    }

    pub fn hash_field(&self) -> String {
        hash_field(&self.code)
    }

    pub fn metric_spaces_field(&self) -> String {
        metric_spaces_field(&self.code)
    }

    /// Serialize a vector of this feature type.
    pub fn encode(&self, vector: &FeatureVector) -> Result<Vec<u8>> {
        self.kind.encode(vector)
    }

    /// Deserialize a stored vector of this feature type.
    pub fn decode(&self, bytes: &[u8]) -> Result<FeatureVector> {
        self.kind.decode(bytes)
    }

    /// Deserialize into a reusable scratch vector.
    pub fn decode_into(&self, bytes: &[u8], scratch: &mut FeatureVector) -> Result<()> {
        self.kind.decode_into(bytes, scratch)
    }

    /// Distance between two vectors of this feature type.
    pub fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> Result<f64> {
        self.metric.distance(a, b)
    }
}

/// Turns an encoded image into a feature vector.
///
/// Image decoding and the descriptor algorithms live outside this crate;
/// implementations are handed to the searcher and the ingestion pipeline.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, descriptor: &FeatureDescriptor, image: &[u8]) -> Result<FeatureVector>;
}
