//! The image searcher: hashing, candidate retrieval and re-ranking.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::config::{EngineConfig, SearchDefaults};
use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::{FeatureDescriptor, FeatureExtractor};
use crate::feature::registry::FeatureRegistry;
use crate::feature::vector::FeatureVector;
use crate::hashing::HashingResources;
use crate::hashing::token::HashToken;
use crate::index::{CandidateIndex, DocId, ID_FIELD, TITLE_FIELD};
use crate::query::builder::MATCH_ALL_ACCURACY;
use crate::query::{CandidateQuery, QueryBuilder};
use crate::rerank::ReRanker;
use crate::search::request::SearchRequest;
use crate::search::response::{ExtractResponse, SearchHit, SearchResponse, SearchTimings};
use crate::statistics::HashTermStatistics;

/// Searches an index for images similar to a query feature.
///
/// Owns the feature registry, the hashing resources and the term
/// statistics; share it between threads through `Arc`.
pub struct ImageSearcher {
    registry: Arc<FeatureRegistry>,
    resources: HashingResources,
    statistics: HashTermStatistics,
    index: Arc<dyn CandidateIndex>,
    defaults: SearchDefaults,
}

impl fmt::Debug for ImageSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSearcher")
            .field("features", &self.registry.len())
            .field("resources", &self.resources)
            .field("statistics", &self.statistics)
            .field("defaults", &self.defaults)
            .finish_non_exhaustive()
    }
}

impl ImageSearcher {
    /// Load the hashing resources named by `config`. Resource errors are
    /// fatal and returned as is.
    pub fn new(
        config: &EngineConfig,
        registry: FeatureRegistry,
        index: Arc<dyn CandidateIndex>,
    ) -> Result<Self> {
        config.validate()?;
        let resources = HashingResources::load(&config.hashing, &registry)?;
        Ok(Self::with_resources(
            Arc::new(registry),
            resources,
            config.search.clone(),
            index,
        ))
    }

    pub fn with_resources(
        registry: Arc<FeatureRegistry>,
        resources: HashingResources,
        defaults: SearchDefaults,
        index: Arc<dyn CandidateIndex>,
    ) -> Self {
        ImageSearcher {
            registry,
            resources,
            statistics: HashTermStatistics::new(),
            index,
            defaults,
        }
    }

    /// A request carrying the configured defaults.
    pub fn request(&self) -> SearchRequest {
        SearchRequest::from(&self.defaults)
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn resources(&self) -> &HashingResources {
        &self.resources
    }

    pub fn statistics(&self) -> &HashTermStatistics {
        &self.statistics
    }

    pub fn index(&self) -> &dyn CandidateIndex {
        self.index.as_ref()
    }

    fn descriptor(&self, request: &SearchRequest) -> Result<&FeatureDescriptor> {
        let field = FeatureRegistry::normalize_hash_field(&request.hash_field);
        self.registry.require_hash_field(&field)
    }

    /// Search with a feature vector of the requested feature type.
    pub fn search_by_feature(
        &self,
        request: &SearchRequest,
        vector: &FeatureVector,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let descriptor = self.descriptor(request)?;
        request.check_deadline("hashing")?;

        let mut warnings = Vec::new();
        let query = self.candidate_query(request, descriptor, vector, &mut warnings)?;
        self.execute(request, descriptor, vector, query, warnings, started.elapsed())
    }

    /// Search with the stored feature of an indexed document.
    pub fn search_by_id(&self, request: &SearchRequest, external_id: &str) -> Result<SearchResponse> {
        let descriptor = self.descriptor(request)?;
        let doc = self
            .index
            .lookup_id(external_id)?
            .ok_or_else(|| ImgsimError::not_found(format!("document {external_id}")))?;
        let histogram_field = descriptor.histogram_field();
        let bytes = self
            .index
            .feature_bytes(doc, &histogram_field)?
            .ok_or_else(|| {
                ImgsimError::not_found(format!("{histogram_field} of document {external_id}"))
            })?;
        let vector = descriptor.decode(&bytes)?;
        self.search_by_feature(request, &vector)
    }

    /// Extract the requested feature from an image, then search with it.
    pub fn search_by_image(
        &self,
        request: &SearchRequest,
        image: &[u8],
        extractor: &dyn FeatureExtractor,
    ) -> Result<SearchResponse> {
        let descriptor = self.descriptor(request)?;
        let vector = extractor.extract(descriptor, image)?;
        self.search_by_feature(request, &vector)
    }

    /// Search with precomputed terms (`term` or `term^boost`, whitespace
    /// separated), used verbatim on the hash field or, with
    /// `use_metric_spaces`, on the MetricSpaces field. `feature_bytes` is the
    /// query feature used for re-ranking.
    pub fn search_by_hashes(
        &self,
        request: &SearchRequest,
        feature_bytes: &[u8],
        terms: &str,
    ) -> Result<SearchResponse> {
        let started = Instant::now();
        let descriptor = self.descriptor(request)?;
        let vector = descriptor.decode(feature_bytes)?;
        if terms.trim().is_empty() {
            return Err(ImgsimError::invalid_argument("no hash terms given"));
        }

        let field = if request.use_metric_spaces {
            descriptor.metric_spaces_field()
        } else {
            descriptor.hash_field()
        };
        let query = CandidateQuery::parse_terms(&field, terms)?;
        self.execute(request, descriptor, &vector, query, Vec::new(), started.elapsed())
    }

    /// Hash a feature vector and report the terms and queries a search
    /// would use.
    pub fn extract(&self, request: &SearchRequest, vector: &FeatureVector) -> Result<ExtractResponse> {
        let descriptor = self.descriptor(request)?;
        let histogram = descriptor.encode(vector)?;

        let hash_field = descriptor.hash_field();
        let terms = self.bit_sampling_terms(vector)?;
        self.statistics.ensure_populated(self.index.as_ref(), &hash_field)?;
        let builder = QueryBuilder::new(&self.statistics);
        let bs_list = builder.order_hashes(&terms, &hash_field, false);
        let ordered = builder.order_hashes(&terms, &hash_field, true);
        let length = QueryBuilder::query_length(terms.len(), request.accuracy, ordered.len());
        let bs_query = ordered[..length].join(" ");

        let metric_spaces = &self.resources.metric_spaces;
        let (ms_list, ms_query) = if metric_spaces.supports(descriptor) {
            let list = metric_spaces
                .generate(descriptor, vector)?
                .iter()
                .map(|id| id.term())
                .collect();
            let posting_list_length = metric_spaces.posting_list_length(descriptor)?;
            let length =
                QueryBuilder::query_length(posting_list_length, request.accuracy, posting_list_length);
            let query = metric_spaces
                .boosted_terms(descriptor, vector, length)?
                .iter()
                .map(|(id, boost)| format!("{id}^{boost}"))
                .collect::<Vec<_>>()
                .join(" ");
            (Some(list), Some(query))
        } else {
            (None, None)
        };

        Ok(ExtractResponse {
            histogram,
            bs_list,
            bs_query,
            ms_list,
            ms_query,
        })
    }

    /// Up to `rows` distinct random documents passing the request filters,
    /// drawn from the first `max_candidates` of them.
    pub fn random_documents<R>(
        &self,
        request: &SearchRequest,
        rows: usize,
        rng: &mut R,
    ) -> Result<Vec<SearchHit>>
    where
        R: Rng + ?Sized,
    {
        let mut docs = self.index.all_documents(&request.filters)?;
        docs.truncate(request.max_candidates);
        let rows = rows.min(docs.len());
        if rows == 0 {
            debug!("no documents to sample");
            return Ok(Vec::new());
        }

        rand::seq::index::sample(rng, docs.len(), rows)
            .iter()
            .map(|i| self.hit(docs[i], 0.0))
            .collect()
    }

    fn bit_sampling_terms(&self, vector: &FeatureVector) -> Result<Vec<String>> {
        Ok(self
            .resources
            .bit_sampling
            .generate(vector)?
            .iter()
            .map(HashToken::term)
            .collect())
    }

    fn candidate_query(
        &self,
        request: &SearchRequest,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
        warnings: &mut Vec<String>,
    ) -> Result<CandidateQuery> {
        if QueryBuilder::clamp_accuracy(request.accuracy) >= MATCH_ALL_ACCURACY {
            debug!(accuracy = request.accuracy, "accuracy at or above 0.9, re-ranking every document");
            return Ok(CandidateQuery::MatchAll);
        }

        if request.use_metric_spaces {
            return match QueryBuilder::build_metric_spaces_query(
                &self.resources.metric_spaces,
                descriptor,
                vector,
                request.accuracy,
            ) {
                Err(ImgsimError::UnsupportedScheme(reason)) => {
                    warn!(feature = descriptor.code(), %reason, "falling back to a match-all query");
                    warnings.push(format!(
                        "MetricSpaces does not support {}, all documents were re-ranked",
                        descriptor.name()
                    ));
                    Ok(CandidateQuery::MatchAll)
                }
                other => other,
            };
        }

        let hash_field = descriptor.hash_field();
        let terms = self.bit_sampling_terms(vector)?;
        self.statistics.ensure_populated(self.index.as_ref(), &hash_field)?;
        Ok(QueryBuilder::new(&self.statistics).build_approximate_query(
            &terms,
            &hash_field,
            request.accuracy,
        ))
    }

    fn execute(
        &self,
        request: &SearchRequest,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
        query: CandidateQuery,
        warnings: Vec<String>,
        query_time: Duration,
    ) -> Result<SearchResponse> {
        request.check_deadline("candidate retrieval")?;
        let retrieval_started = Instant::now();
        let candidates = self
            .index
            .search(&query, &request.filters, request.max_candidates)?;
        let retrieval = retrieval_started.elapsed();

        let rerank_started = Instant::now();
        let outcome = if request.parallel_rerank {
            ReRanker::rerank_parallel(
                vector,
                descriptor,
                &candidates.docs,
                self.index.as_ref(),
                request.top_k,
                request.deadline,
            )?
        } else {
            ReRanker::rerank(
                vector,
                descriptor,
                &candidates.docs,
                self.index.as_ref(),
                request.top_k,
                request.deadline,
            )?
        };
        let rerank = rerank_started.elapsed();

        let hits = outcome
            .results
            .iter()
            .map(|result| self.hit(result.doc, result.distance))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            field = %descriptor.hash_field(),
            candidates = candidates.docs.len(),
            total_hits = candidates.total_hits,
            hits = hits.len(),
            skipped = outcome.skipped,
            ?retrieval,
            ?rerank,
            "search finished"
        );

        Ok(SearchResponse {
            query_field: descriptor.hash_field(),
            query_feature: descriptor.name().to_string(),
            candidate_query: query.to_string(),
            hits,
            raw_docs_count: candidates.total_hits,
            skipped_candidates: outcome.skipped,
            warnings,
            timings: SearchTimings {
                query: query_time,
                retrieval,
                rerank,
            },
        })
    }

    fn hit(&self, doc: DocId, distance: f64) -> Result<SearchHit> {
        Ok(SearchHit {
            doc,
            id: self.index.stored_field(doc, ID_FIELD)?,
            title: self.index.stored_field(doc, TITLE_FIELD)?,
            distance,
        })
    }
}
