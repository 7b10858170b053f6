//! Document frequencies of hash terms.
//!
//! Token selection prefers rare hash terms, so every hash field needs a
//! term → document frequency table. Tables are filled lazily by scanning the
//! index the first time a field is queried and then live as long as the
//! [`HashTermStatistics`] value (usually owned by an
//! [`ImageSearcher`](crate::search::ImageSearcher)). They are not refreshed
//! when documents are added; call [`HashTermStatistics::reset`] or
//! [`HashTermStatistics::clear`] after reindexing.

use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ImgsimError, Result};
use crate::index::CandidateIndex;

type FrequencyTable = AHashMap<String, u32>;

/// Per-field document frequency tables, each computed at most once.
#[derive(Debug, Default)]
pub struct HashTermStatistics {
    fields: RwLock<AHashMap<String, Arc<OnceCell<FrequencyTable>>>>,
}

impl HashTermStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the table of `field` unless already done.
    ///
    /// Concurrent callers for the same field wait for a single index scan.
    /// A failed scan leaves the field unpopulated.
    pub fn ensure_populated<I>(&self, index: &I, field: &str) -> Result<()>
    where
        I: CandidateIndex + ?Sized,
    {
        let cell = self.cell(field);
        cell.get_or_try_init(|| {
            let freqs = index.term_doc_freqs(field)?;
            debug!(field, terms = freqs.len(), "populated hash term statistics");
            Ok::<_, ImgsimError>(freqs.into_iter().collect())
        })?;
        Ok(())
    }

    fn cell(&self, field: &str) -> Arc<OnceCell<FrequencyTable>> {
        if let Some(cell) = self.fields.read().get(field) {
            return Arc::clone(cell);
        }
        Arc::clone(self.fields.write().entry(field.to_string()).or_default())
    }

    /// Document frequency of a term; 0 for unknown terms and unpopulated fields.
    pub fn doc_freq(&self, field: &str, term: &str) -> u32 {
        self.fields
            .read()
            .get(field)
            .and_then(|cell| cell.get())
            .and_then(|table| table.get(term).copied())
            .unwrap_or(0)
    }

    pub fn is_populated(&self, field: &str) -> bool {
        self.fields
            .read()
            .get(field)
            .is_some_and(|cell| cell.get().is_some())
    }

    /// Forget the table of one field.
    pub fn reset(&self, field: &str) {
        self.fields.write().remove(field);
    }

    /// Forget every table.
    pub fn clear(&self) {
        self.fields.write().clear();
    }
}
