//! Startup resources shared by every search and ingestion worker.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::HashingConfig;
use crate::error::Result;
use crate::feature::registry::FeatureRegistry;
use crate::hashing::bit_sampling::BitSampling;
use crate::hashing::metric_spaces::MetricSpaces;

/// Immutable hashing tables, loaded once and shared through `Arc`.
#[derive(Debug, Clone)]
pub struct HashingResources {
    pub bit_sampling: Arc<BitSampling>,
    pub metric_spaces: Arc<MetricSpaces>,
}

impl HashingResources {
    pub fn new(bit_sampling: BitSampling, metric_spaces: MetricSpaces) -> Self {
        Self {
            bit_sampling: Arc::new(bit_sampling),
            metric_spaces: Arc::new(metric_spaces),
        }
    }

    /// Load the tables named by the configuration. Any failure is a
    /// [`Resource`](crate::error::ImgsimError::Resource) error and must abort
    /// startup.
    pub fn load(config: &HashingConfig, registry: &FeatureRegistry) -> Result<Self> {
        let bit_sampling = match &config.bit_sampling {
            Some(path) => BitSampling::load(path)?,
            None => {
                warn!(
                    seed = config.seed,
                    "no BitSampling table configured, generating one from the seed"
                );
                BitSampling::generate_random(
                    config.dimensions,
                    config.bits,
                    config.bundles,
                    config.seed,
                )?
            }
        };

        let metric_spaces = MetricSpaces::load_all(&config.metric_spaces, registry)?;
        info!(
            bundles = bit_sampling.bundles(),
            metric_spaces = ?metric_spaces.supported_codes(),
            "hashing resources ready"
        );

        Ok(Self::new(bit_sampling, metric_spaces))
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::feature::vector::FeatureVector;

    #[test]
    fn test_generated_table_is_reproducible() {
        let config = HashingConfig {
            dimensions: 8,
            bits: 4,
            bundles: 6,
            ..HashingConfig::default()
        };
        let registry = FeatureRegistry::with_defaults();
        let a = HashingResources::load(&config, &registry).unwrap();
        let b = HashingResources::load(&config, &registry).unwrap();

        let vector = FeatureVector::Double(vec![1.0, -2.0, 0.5, 0.0, 3.0, 1.0, 1.0, -1.0]);
        assert_eq!(
            a.bit_sampling.generate(&vector).unwrap(),
            b.bit_sampling.generate(&vector).unwrap()
        );
        assert!(a.metric_spaces.supported_codes().is_empty());
    }

    #[test]
    fn test_missing_files_are_fatal() {
        let registry = FeatureRegistry::with_defaults();
        let config = HashingConfig {
            bit_sampling: Some(PathBuf::from("/nonexistent/bits.bslh")),
            ..HashingConfig::default()
        };
        assert!(HashingResources::load(&config, &registry).unwrap_err().is_fatal());

        let config = HashingConfig {
            metric_spaces: vec![PathBuf::from("/nonexistent/cl.msrp")],
            ..HashingConfig::default()
        };
        assert!(HashingResources::load(&config, &registry).unwrap_err().is_fatal());
    }
}
