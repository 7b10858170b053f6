//! Registry of the supported feature types.
//!
//! Registration happens through [`FeatureRegistryBuilder`]; once built, the
//! [`FeatureRegistry`] is immutable and can be shared between searches
//! without locking. Every lookup is a single hash map probe and reports
//! unregistered names as `None` (or [`ImgsimError::UnknownField`] through
//! the `require_*` variants) instead of substituting a default feature.

use std::fmt;

use ahash::AHashMap;

use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::{
    FeatureDescriptor, HASH_FIELD_SUFFIX, METRIC_SPACES_FIELD_SUFFIX,
};
use crate::feature::distance::DistanceMetric;
use crate::feature::vector::VectorKind;

/// Collects feature descriptors before the registry is frozen.
#[derive(Debug, Default)]
pub struct FeatureRegistryBuilder {
    descriptors: Vec<FeatureDescriptor>,
}

impl FeatureRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature type. Codes must be unique and non-empty.
    pub fn register(&mut self, descriptor: FeatureDescriptor) -> Result<&mut Self> {
        if descriptor.code().is_empty() {
            return Err(ImgsimError::invalid_argument("feature code must not be empty"));
        }
        if self.descriptors.iter().any(|d| d.code() == descriptor.code()) {
            return Err(ImgsimError::invalid_argument(format!(
                "feature code {} registered twice",
                descriptor.code()
            )));
        }
        self.descriptors.push(descriptor);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> FeatureRegistry {
        let mut by_code = AHashMap::with_capacity(self.descriptors.len());
        let mut by_hash_field = AHashMap::with_capacity(self.descriptors.len());
        let mut by_histogram_field = AHashMap::with_capacity(self.descriptors.len());
        let mut by_metric_spaces_field = AHashMap::with_capacity(self.descriptors.len());

        for (slot, descriptor) in self.descriptors.iter().enumerate() {
            by_code.insert(descriptor.code().to_string(), slot);
            by_hash_field.insert(descriptor.hash_field(), slot);
            by_histogram_field.insert(descriptor.histogram_field(), slot);
            by_metric_spaces_field.insert(descriptor.metric_spaces_field(), slot);
        }

        FeatureRegistry {
            descriptors: self.descriptors,
            by_code,
            by_hash_field,
            by_histogram_field,
            by_metric_spaces_field,
        }
    }
}

/// Immutable lookup table: feature code ↔ descriptor ↔ field names.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    descriptors: Vec<FeatureDescriptor>,
    by_code: AHashMap<String, usize>,
    by_hash_field: AHashMap<String, usize>,
    by_histogram_field: AHashMap<String, usize>,
    by_metric_spaces_field: AHashMap<String, usize>,
}

impl FeatureRegistry {
    pub fn builder() -> FeatureRegistryBuilder {
        FeatureRegistryBuilder::new()
    }

    /// Registry holding the standard global features of the image search plugin.
    pub fn with_defaults() -> Self {
        use DistanceMetric::*;
        use VectorKind::*;

        let defaults = [
            ("cl", "ColorLayout", DenseDouble, Euclidean),
            ("eh", "EdgeHistogram", DenseDouble, Manhattan),
            ("jc", "JCD", DenseDouble, Tanimoto),
            ("oh", "OpponentHistogram", DenseDouble, Manhattan),
            ("ph", "PHOG", DenseDouble, Manhattan),
            ("ac", "AutoColorCorrelogram", DenseDouble, Manhattan),
            ("ad", "ACCID", DenseDouble, Manhattan),
            ("ce", "CEDD", DenseDouble, Tanimoto),
            ("fc", "FCTH", DenseDouble, Tanimoto),
            ("fo", "FuzzyOpponentHistogram", DenseDouble, Manhattan),
            ("jh", "JointHistogram", DenseDouble, Manhattan),
            ("sc", "ScalableColor", DenseDouble, Manhattan),
            ("pc", "SPCEDD", DenseDouble, Tanimoto),
            ("df", "DoubleFeatureCosineDistance", DenseDouble, Cosine),
            ("if", "GenericIntFeature", DenseDouble, Manhattan),
            ("sf", "ShortFeatureCosineDistance", SparseShort, Cosine),
        ];

        let descriptors = defaults
            .into_iter()
            .map(|(code, name, kind, metric)| FeatureDescriptor::new(code, name, kind, metric))
            .collect();
        FeatureRegistryBuilder { descriptors }.build()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in registration order.
    pub fn descriptors(&self) -> &[FeatureDescriptor] {
        &self.descriptors
    }

    pub fn by_code(&self, code: &str) -> Option<&FeatureDescriptor> {
        self.by_code.get(code).map(|&slot| &self.descriptors[slot])
    }

    pub fn by_hash_field(&self, field: &str) -> Option<&FeatureDescriptor> {
        self.by_hash_field.get(field).map(|&slot| &self.descriptors[slot])
    }

    pub fn by_histogram_field(&self, field: &str) -> Option<&FeatureDescriptor> {
        self.by_histogram_field
            .get(field)
            .map(|&slot| &self.descriptors[slot])
    }

    pub fn by_metric_spaces_field(&self, field: &str) -> Option<&FeatureDescriptor> {
        self.by_metric_spaces_field
            .get(field)
            .map(|&slot| &self.descriptors[slot])
    }

    pub fn require_hash_field(&self, field: &str) -> Result<&FeatureDescriptor> {
        self.by_hash_field(field)
            .ok_or_else(|| ImgsimError::unknown_field(field))
    }

    pub fn require_histogram_field(&self, field: &str) -> Result<&FeatureDescriptor> {
        self.by_histogram_field(field)
            .ok_or_else(|| ImgsimError::unknown_field(field))
    }

    /// Code of a registered descriptor, `None` if this exact descriptor is unknown.
    pub fn code_for(&self, descriptor: &FeatureDescriptor) -> Option<&str> {
        self.by_code(descriptor.code())
            .filter(|registered| *registered == descriptor)
            .map(|registered| registered.code())
    }

    /// Histogram field paired with a hash field.
    pub fn histogram_field_for_hash_field(&self, field: &str) -> Option<String> {
        self.by_hash_field(field).map(|d| d.histogram_field())
    }

    /// Normalize a user supplied field parameter to a hash field name.
    ///
    /// Accepts a bare code (`cl`), a hash field (`cl_ha`) or a MetricSpaces
    /// field (`cl_ms`). The result is not checked against the registry.
    pub fn normalize_hash_field(param: &str) -> String {
        let base = param.trim();
        let base = base.strip_suffix(METRIC_SPACES_FIELD_SUFFIX).unwrap_or(base);
        if base.ends_with(HASH_FIELD_SUFFIX) {
            base.to_string()
        } else {
            format!("{base}{HASH_FIELD_SUFFIX}")
        }
    }
}

impl fmt::Display for FeatureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Registered features:")?;
        writeln!(f, "code\thash field\tfeature field\tname")?;
        for descriptor in &self.descriptors {
            writeln!(
                f,
                "{}\t{}\t{}\t{}",
                descriptor.code(),
                descriptor.hash_field(),
                descriptor.histogram_field(),
                descriptor.name()
            )?;
        }
        Ok(())
    }
}
