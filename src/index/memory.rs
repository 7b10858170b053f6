//! In-memory [`CandidateIndex`].

use std::cmp::Ordering;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ImgsimError, Result};
use crate::index::{CandidateIndex, CandidateSet, DocId, Filter, ID_FIELD, TITLE_FIELD};
use crate::ingest::EncodedDocument;
use crate::query::CandidateQuery;

/// A document as handed to [`MemoryIndex::add`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryDocument {
    stored: AHashMap<String, String>,
    binary: AHashMap<String, Vec<u8>>,
    terms: AHashMap<String, String>,
}

impl MemoryDocument {
    /// A document with the given external id.
    pub fn new<S: Into<String>>(id: S) -> Self {
        MemoryDocument::default().with_stored(ID_FIELD, id)
    }

    pub fn with_stored<F: Into<String>, V: Into<String>>(mut self, field: F, value: V) -> Self {
        self.stored.insert(field.into(), value.into());
        self
    }

    pub fn with_binary<F: Into<String>>(mut self, field: F, bytes: Vec<u8>) -> Self {
        self.binary.insert(field.into(), bytes);
        self
    }

    /// Whitespace separated terms of a term field.
    pub fn with_terms<F: Into<String>, V: Into<String>>(mut self, field: F, text: V) -> Self {
        self.terms.insert(field.into(), text.into());
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.stored.get(ID_FIELD).map(String::as_str)
    }
}

impl From<EncodedDocument> for MemoryDocument {
    fn from(encoded: EncodedDocument) -> Self {
        let mut doc = MemoryDocument::new(encoded.id);
        if let Some(title) = encoded.title {
            doc = doc.with_stored(TITLE_FIELD, title);
        }
        for (field, bytes) in encoded.binary {
            doc = doc.with_binary(field, bytes);
        }
        for (field, text) in encoded.terms {
            doc = doc.with_terms(field, text);
        }
        doc
    }
}

#[derive(Debug)]
struct StoredDocument {
    stored: AHashMap<String, String>,
    binary: AHashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
struct Inner {
    docs: Vec<StoredDocument>,
    ids: AHashMap<String, DocId>,
    /// field -> term -> (doc id, occurrences) in ascending doc id order.
    postings: AHashMap<String, AHashMap<String, Vec<(DocId, u32)>>>,
}

impl Inner {
    fn passes(&self, doc: DocId, filters: &[Filter]) -> bool {
        let stored = &self.docs[doc as usize].stored;
        filters.iter().all(|filter| match filter {
            Filter::Term { field, value } => stored.get(field) == Some(value),
        })
    }
}

/// Thread-safe in-memory index of image documents.
///
/// Documents get consecutive [`DocId`]s in insertion order. Term fields are
/// tokenized on whitespace; a document matches a clause when the term occurs
/// in the field at least once and scores `boost * sqrt(occurrences)` for it,
/// so repeated terms (such as MetricSpaces proximity terms) weigh more.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a document. External ids must be unique.
    pub fn add(&self, doc: MemoryDocument) -> Result<DocId> {
        let id = doc
            .id()
            .ok_or_else(|| ImgsimError::invalid_argument("document has no id"))?
            .to_string();

        let mut inner = self.inner.write();
        if inner.ids.contains_key(&id) {
            return Err(ImgsimError::index(format!("duplicate document id {id}")));
        }
        let doc_id = DocId::try_from(inner.docs.len())
            .map_err(|_| ImgsimError::index("memory index is full"))?;

        for (field, text) in &doc.terms {
            let mut counts: AHashMap<&str, u32> = AHashMap::new();
            for term in text.split_whitespace() {
                *counts.entry(term).or_insert(0) += 1;
            }
            let field_postings = inner.postings.entry(field.clone()).or_default();
            for (term, count) in counts {
                field_postings
                    .entry(term.to_string())
                    .or_default()
                    .push((doc_id, count));
            }
        }
        inner.ids.insert(id, doc_id);
        inner.docs.push(StoredDocument {
            stored: doc.stored,
            binary: doc.binary,
        });
        Ok(doc_id)
    }

    /// Add the output of a [`DocumentEncoder`](crate::ingest::DocumentEncoder).
    pub fn add_encoded(&self, encoded: EncodedDocument) -> Result<DocId> {
        self.add(encoded.into())
    }
}

impl CandidateIndex for MemoryIndex {
    fn search(
        &self,
        query: &CandidateQuery,
        filters: &[Filter],
        max_candidates: usize,
    ) -> Result<CandidateSet> {
        let inner = self.inner.read();

        let (field, clauses) = match query {
            CandidateQuery::MatchAll => {
                let mut docs: Vec<DocId> = (0..inner.docs.len() as DocId)
                    .filter(|&doc| inner.passes(doc, filters))
                    .collect();
                let total_hits = docs.len();
                docs.truncate(max_candidates);
                return Ok(CandidateSet { docs, total_hits });
            }
            CandidateQuery::Terms { field, clauses } => (field, clauses),
        };

        let mut scores: AHashMap<DocId, f32> = AHashMap::new();
        if let Some(field_postings) = inner.postings.get(field) {
            for clause in clauses {
                if let Some(docs) = field_postings.get(&clause.term) {
                    for &(doc, count) in docs {
                        *scores.entry(doc).or_insert(0.0) += clause.boost * (count as f32).sqrt();
                    }
                }
            }
        }

        let mut scored: Vec<(DocId, f32)> = scores
            .into_iter()
            .filter(|&(doc, _)| inner.passes(doc, filters))
            .collect();
        let total_hits = scored.len();
        scored.sort_unstable_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(max_candidates);
        debug!(%field, clauses = clauses.len(), total_hits, "memory index candidate search");

        Ok(CandidateSet {
            docs: scored.into_iter().map(|(doc, _)| doc).collect(),
            total_hits,
        })
    }

    fn feature_bytes(&self, doc: DocId, histogram_field: &str) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();
        let stored = inner
            .docs
            .get(doc as usize)
            .ok_or_else(|| ImgsimError::index(format!("no document {doc}")))?;
        Ok(stored.binary.get(histogram_field).cloned())
    }

    fn term_doc_freqs(&self, field: &str) -> Result<Vec<(String, u32)>> {
        let inner = self.inner.read();
        Ok(inner
            .postings
            .get(field)
            .map(|terms| {
                terms
                    .iter()
                    .map(|(term, docs)| (term.clone(), docs.len() as u32))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn lookup_id(&self, external_id: &str) -> Result<Option<DocId>> {
        Ok(self.inner.read().ids.get(external_id).copied())
    }

    fn stored_field(&self, doc: DocId, field: &str) -> Result<Option<String>> {
        let inner = self.inner.read();
        let stored = inner
            .docs
            .get(doc as usize)
            .ok_or_else(|| ImgsimError::index(format!("no document {doc}")))?;
        Ok(stored.stored.get(field).cloned())
    }

    fn all_documents(&self, filters: &[Filter]) -> Result<Vec<DocId>> {
        let inner = self.inner.read();
        Ok((0..inner.docs.len() as DocId)
            .filter(|&doc| inner.passes(doc, filters))
            .collect())
    }
}
