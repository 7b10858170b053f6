//! Engine configuration, read from JSON.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImgsimError, Result};

/// Top level configuration of an image search engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hashing resources.
    pub hashing: HashingConfig,
    /// Defaults applied to new search requests.
    pub search: SearchDefaults,
    /// Parallel ingestion.
    pub ingest: IngestConfig,
}

impl EngineConfig {
    /// Read and validate a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hashing.validate()?;
        self.search.validate()?;
        self.ingest.validate()
    }
}

/// Where the hashing tables come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashingConfig {
    /// Persisted BitSampling table. Without one a table is generated from
    /// the shape and seed below.
    pub bit_sampling: Option<PathBuf>,
    /// One persisted reference point table per MetricSpaces feature.
    pub metric_spaces: Vec<PathBuf>,
    pub dimensions: usize,
    pub bits: usize,
    pub bundles: usize,
    pub seed: u64,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            bit_sampling: None,
            metric_spaces: Vec::new(),
            dimensions: 640,
            bits: 12,
            bundles: 150,
            seed: 42,
        }
    }
}

impl HashingConfig {
    fn validate(&self) -> Result<()> {
        if self.bit_sampling.is_none() {
            if self.dimensions == 0 || self.bundles == 0 {
                return Err(ImgsimError::invalid_config(
                    "hashing.dimensions and hashing.bundles must be positive",
                ));
            }
            if self.bits == 0 || self.bits > 32 {
                return Err(ImgsimError::invalid_config(format!(
                    "hashing.bits must be in 1..=32, got {}",
                    self.bits
                )));
            }
        }
        Ok(())
    }
}

/// Request parameters used when a caller does not set them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchDefaults {
    /// Fraction of hash tokens queried, clamped to `[0.1, 1.0]`.
    pub accuracy: f64,
    /// Upper bound on candidates handed to re-ranking.
    pub max_candidates: usize,
    /// Number of results returned.
    pub top_k: usize,
    pub hash_field: String,
    pub use_metric_spaces: bool,
    pub parallel_rerank: bool,
}

impl Default for SearchDefaults {
    fn default() -> Self {
        Self {
            accuracy: 0.33,
            max_candidates: 10_000,
            top_k: 60,
            hash_field: "cl_ha".to_string(),
            use_metric_spaces: false,
            parallel_rerank: false,
        }
    }
}

impl SearchDefaults {
    fn validate(&self) -> Result<()> {
        if !self.accuracy.is_finite() {
            return Err(ImgsimError::invalid_config("search.accuracy must be finite"));
        }
        if self.hash_field.trim().is_empty() {
            return Err(ImgsimError::invalid_config("search.hash_field must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Encoder threads.
    pub workers: usize,
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            queue_capacity: 100,
        }
    }
}

impl IngestConfig {
    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(ImgsimError::invalid_config("ingest.workers must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(ImgsimError::invalid_config(
                "ingest.queue_capacity must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.search.accuracy, 0.33);
        assert_eq!(config.search.max_candidates, 10_000);
        assert_eq!(config.search.top_k, 60);
        assert_eq!(config.search.hash_field, "cl_ha");
        assert!(!config.search.use_metric_spaces);
        assert_eq!(config.hashing.bits, 12);
        assert!(config.ingest.workers > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"search": {"top_k": 10}, "ingest": {"workers": 2}}"#).unwrap();
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.search.accuracy, 0.33);
        assert_eq!(config.ingest.workers, 2);
        assert_eq!(config.ingest.queue_capacity, 100);
        assert_eq!(config.hashing.bundles, 150);
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"hashing": {{"bits": 40}}}}"#).unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ImgsimError::Other(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            EngineConfig::from_file(file.path()),
            Err(ImgsimError::Json(_))
        ));
    }
}
