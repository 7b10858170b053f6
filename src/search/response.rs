//! Search and extraction results.

use std::time::Duration;

use serde::Serialize;

use crate::index::DocId;

/// One ranked document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub doc: DocId,
    /// External id, when stored.
    pub id: Option<String>,
    pub title: Option<String>,
    /// Distance to the query feature; 0 for documents not ranked against one.
    pub distance: f64,
}

/// Wall time spent per search stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SearchTimings {
    /// Hashing and query construction.
    pub query: Duration,
    /// Candidate retrieval from the index.
    pub retrieval: Duration,
    pub rerank: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Hash field the search ran on.
    pub query_field: String,
    /// Name of the feature compared.
    pub query_feature: String,
    /// Candidate query as sent to the index.
    pub candidate_query: String,
    /// Best hits first.
    pub hits: Vec<SearchHit>,
    /// Documents matching the candidate query before truncation.
    pub raw_docs_count: usize,
    /// Candidates without a usable stored feature.
    pub skipped_candidates: usize,
    /// Degradations the caller should know about.
    pub warnings: Vec<String>,
    pub timings: SearchTimings,
}

/// Hashes and queries derived from one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractResponse {
    /// Encoded feature, as stored in the histogram field.
    pub histogram: Vec<u8>,
    /// Every BitSampling term, rarest first.
    pub bs_list: Vec<String>,
    /// BitSampling terms a query at the requested accuracy uses.
    pub bs_query: String,
    /// MetricSpaces posting list, when the feature is supported.
    pub ms_list: Option<Vec<String>>,
    /// Boosted MetricSpaces query (`term^boost …`), when supported.
    pub ms_query: Option<String>,
}
