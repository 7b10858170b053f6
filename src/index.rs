//! Boundary to the index holding candidate documents.
//!
//! The search core only needs a handful of operations from the index: run a
//! candidate query, fetch the stored feature bytes of a document, read the
//! document frequencies of a hash field and resolve stored fields. Any index
//! implementing [`CandidateIndex`] can back an
//! [`ImageSearcher`](crate::search::ImageSearcher); [`MemoryIndex`] is the
//! in-process implementation.

pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::query::CandidateQuery;

pub use memory::{MemoryDocument, MemoryIndex};

/// Internal document number, dense and assigned by the index.
pub type DocId = u32;

/// Stored field holding the external document id.
pub const ID_FIELD: &str = "id";

/// Stored field holding the optional document title.
pub const TITLE_FIELD: &str = "title";

/// Restriction applied on top of a candidate query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// The stored field must equal the value.
    Term { field: String, value: String },
}

impl Filter {
    pub fn term<F: Into<String>, V: Into<String>>(field: F, value: V) -> Self {
        Filter::Term {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result of a candidate query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateSet {
    /// Matching documents, best first, at most `max_candidates` of them.
    pub docs: Vec<DocId>,
    /// Number of matching documents before truncation.
    pub total_hits: usize,
}

/// Operations the search core needs from an index.
///
/// Errors are scoped to the request that triggered them.
pub trait CandidateIndex: Send + Sync {
    fn search(
        &self,
        query: &CandidateQuery,
        filters: &[Filter],
        max_candidates: usize,
    ) -> Result<CandidateSet>;

    /// Serialized feature of `doc` stored in a histogram field.
    fn feature_bytes(&self, doc: DocId, histogram_field: &str) -> Result<Option<Vec<u8>>>;

    /// Document frequency of every term of a term field.
    fn term_doc_freqs(&self, field: &str) -> Result<Vec<(String, u32)>>;

    /// Resolve an external id.
    fn lookup_id(&self, external_id: &str) -> Result<Option<DocId>>;

    fn stored_field(&self, doc: DocId, field: &str) -> Result<Option<String>>;

    /// Every document passing the filters, in doc id order.
    fn all_documents(&self, filters: &[Filter]) -> Result<Vec<DocId>>;
}
