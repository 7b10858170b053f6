//! Per-call search parameters.

use std::time::{Duration, Instant};

use crate::config::SearchDefaults;
use crate::error::{ImgsimError, Result};
use crate::index::Filter;

/// Parameters of one search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Hash field naming the feature, e.g. `cl_ha`. A bare code or a
    /// MetricSpaces field is accepted too.
    pub hash_field: String,
    /// Fraction of hash terms queried, clamped to `[0.1, 1.0]`.
    pub accuracy: f64,
    /// Candidates re-ranked at most.
    pub max_candidates: usize,
    /// Results returned.
    pub top_k: usize,
    /// Retrieve candidates through MetricSpaces instead of BitSampling.
    pub use_metric_spaces: bool,
    pub filters: Vec<Filter>,
    /// Point in time after which the search is abandoned.
    pub deadline: Option<Instant>,
    /// Re-rank on the rayon pool.
    pub parallel_rerank: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        SearchRequest::from(&SearchDefaults::default())
    }
}

impl From<&SearchDefaults> for SearchRequest {
    fn from(defaults: &SearchDefaults) -> Self {
        SearchRequest {
            hash_field: defaults.hash_field.clone(),
            accuracy: defaults.accuracy,
            max_candidates: defaults.max_candidates,
            top_k: defaults.top_k,
            use_metric_spaces: defaults.use_metric_spaces,
            filters: Vec::new(),
            deadline: None,
            parallel_rerank: defaults.parallel_rerank,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_field<S: Into<String>>(mut self, field: S) -> Self {
        self.hash_field = field.into();
        self
    }

    pub fn accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = accuracy;
        self
    }

    pub fn max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates;
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn use_metric_spaces(mut self, enabled: bool) -> Self {
        self.use_metric_spaces = enabled;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set the deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn parallel_rerank(mut self, enabled: bool) -> Self {
        self.parallel_rerank = enabled;
        self
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with `Cancelled` once the deadline has passed.
    pub fn check_deadline(&self, stage: &str) -> Result<()> {
        if self.is_expired() {
            return Err(ImgsimError::cancelled(format!("deadline expired before {stage}")));
        }
        Ok(())
    }
}
