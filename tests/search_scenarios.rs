use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use imgsim::config::{IngestConfig, SearchDefaults};
use imgsim::error::{ImgsimError, Result};
use imgsim::feature::{FeatureDescriptor, FeatureExtractor, FeatureRegistry, FeatureVector};
use imgsim::hashing::{BitSampling, HashingResources, MetricSpaces, ReferencePoints};
use imgsim::index::{Filter, MemoryIndex, TITLE_FIELD};
use imgsim::ingest::{DocumentEncoder, ImageSource, ParallelEncoder};
use imgsim::search::{ImageSearcher, SearchResponse};

const CORPUS_SIZE: usize = 40;
const DIMENSIONS: usize = 12;

/// Test images are comma separated feature values.
struct TextExtractor;

impl FeatureExtractor for TextExtractor {
    fn extract(&self, _descriptor: &FeatureDescriptor, image: &[u8]) -> Result<FeatureVector> {
        let text = std::str::from_utf8(image)
            .map_err(|e| ImgsimError::invalid_argument(e.to_string()))?;
        text.split(',')
            .map(|v| {
                v.parse::<f64>()
                    .map_err(|e| ImgsimError::invalid_argument(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()
            .map(FeatureVector::Double)
    }
}

fn corpus_vector(i: usize) -> Vec<f64> {
    (0..DIMENSIONS)
        .map(|j| {
            if j == 0 {
                i as f64
            } else {
                ((i * (j + 1) * 7 + j) % 23) as f64
            }
        })
        .collect()
}

fn image_of(values: &[f64]) -> Vec<u8> {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
        .into_bytes()
}

fn build_resources(registry: &FeatureRegistry) -> Result<HashingResources> {
    let cl = registry
        .by_code("cl")
        .ok_or_else(|| ImgsimError::unknown_field("cl"))?;
    let corpus: Vec<FeatureVector> = (0..CORPUS_SIZE)
        .map(|i| FeatureVector::Double(corpus_vector(i)))
        .collect();
    let points = ReferencePoints::sample(cl, &corpus, 10, 5, 11)?;
    Ok(HashingResources::new(
        BitSampling::generate_random(DIMENSIONS, 12, 30, 7)?,
        MetricSpaces::from_tables([points])?,
    ))
}

/// Ingest the corpus through the parallel encoder and open a searcher on it.
fn build_searcher() -> Result<ImageSearcher> {
    let registry = FeatureRegistry::with_defaults();
    let resources = build_resources(&registry)?;
    let index = Arc::new(MemoryIndex::new());

    let encoder = DocumentEncoder::new(&registry, resources.clone(), &["cl", "eh"])?
        .extractor(Arc::new(TextExtractor))
        .metric_spaces(true);
    let parallel = ParallelEncoder::new(
        encoder,
        &IngestConfig {
            workers: 4,
            queue_capacity: 8,
        },
    );
    let sources = (0..CORPUS_SIZE).map(|i| ImageSource {
        id: format!("img{i}"),
        title: Some(if i % 2 == 0 { "even" } else { "odd" }.to_string()),
        image: image_of(&corpus_vector(i)),
    });
    let report = parallel.run(sources, |doc| index.add_encoded(doc).map(|_| ()))?;
    assert_eq!(report.encoded, CORPUS_SIZE);
    assert_eq!(report.failed, 0);

    let defaults = SearchDefaults {
        max_candidates: CORPUS_SIZE,
        top_k: 10,
        ..SearchDefaults::default()
    };
    Ok(ImageSearcher::with_resources(
        Arc::new(registry),
        resources,
        defaults,
        index,
    ))
}

fn assert_sorted(response: &SearchResponse) {
    assert!(
        response
            .hits
            .windows(2)
            .all(|w| w[0].distance <= w[1].distance)
    );
}

#[test]
fn search_by_id_with_high_accuracy_reranks_every_document() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher.request().accuracy(0.95);

    let response = searcher.search_by_id(&request, "img3")?;
    assert_eq!(response.candidate_query, "*:*");
    assert_eq!(response.raw_docs_count, CORPUS_SIZE);
    assert_eq!(response.hits.len(), 10);
    assert_eq!(response.hits[0].id.as_deref(), Some("img3"));
    assert_eq!(response.hits[0].title.as_deref(), Some("odd"));
    assert_eq!(response.hits[0].distance, 0.0);
    assert_eq!(response.query_field, "cl_ha");
    assert_sorted(&response);
    Ok(())
}

#[test]
fn approximate_search_is_deterministic() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher.request().accuracy(0.5);
    let query = FeatureVector::Double(corpus_vector(17));

    let first = searcher.search_by_feature(&request, &query)?;
    let second = searcher.search_by_feature(&request, &query)?;

    assert!(first.candidate_query.starts_with("cl_ha:"));
    assert!(searcher.statistics().is_populated("cl_ha"));
    assert_eq!(first.hits[0].id.as_deref(), Some("img17"));
    assert_eq!(first.candidate_query, second.candidate_query);
    let ranking = |r: &SearchResponse| -> Vec<(u32, f64)> {
        r.hits.iter().map(|h| (h.doc, h.distance)).collect()
    };
    assert_eq!(ranking(&first), ranking(&second));
    assert_sorted(&first);
    Ok(())
}

#[test]
fn parallel_rerank_matches_sequential() -> Result<()> {
    let searcher = build_searcher()?;
    let query = FeatureVector::Double(corpus_vector(25));
    let request = searcher.request().accuracy(1.0).top_k(CORPUS_SIZE);

    let sequential = searcher.search_by_feature(&request, &query)?;
    let parallel = searcher.search_by_feature(&request.clone().parallel_rerank(true), &query)?;

    assert_eq!(sequential.hits.len(), CORPUS_SIZE);
    assert_eq!(sequential.hits, parallel.hits);
    Ok(())
}

#[test]
fn metric_spaces_search_uses_the_reference_point_field() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher.request().accuracy(0.5).use_metric_spaces(true);
    let query = FeatureVector::Double(corpus_vector(8));

    let response = searcher.search_by_feature(&request, &query)?;
    assert!(response.candidate_query.starts_with("cl_ms:"));
    assert!(response.warnings.is_empty());
    assert_eq!(response.hits[0].id.as_deref(), Some("img8"));
    Ok(())
}

#[test]
fn unsupported_metric_spaces_falls_back_to_match_all() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher
        .request()
        .hash_field("eh_ha")
        .accuracy(0.5)
        .use_metric_spaces(true);
    let query = FeatureVector::Double(corpus_vector(4));

    let response = searcher.search_by_feature(&request, &query)?;
    assert_eq!(response.candidate_query, "*:*");
    assert_eq!(response.raw_docs_count, CORPUS_SIZE);
    assert_eq!(response.warnings.len(), 1);
    assert_eq!(response.hits[0].id.as_deref(), Some("img4"));
    Ok(())
}

#[test]
fn extracted_terms_search_like_the_feature() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher.request().accuracy(0.5);
    let query = FeatureVector::Double(corpus_vector(30));

    let extracted = searcher.extract(&request, &query)?;
    assert_eq!(extracted.bs_list.len(), 30);
    assert_eq!(extracted.ms_list.as_ref().map(Vec::len), Some(5));
    assert!(extracted.ms_query.is_some());

    let response = searcher.search_by_hashes(&request, &extracted.histogram, &extracted.bs_query)?;
    assert!(response.candidate_query.starts_with("cl_ha:"));
    assert_eq!(response.hits[0].id.as_deref(), Some("img30"));

    let ms_request = request.clone().use_metric_spaces(true);
    let ms_query = extracted.ms_query.unwrap_or_default();
    let response = searcher.search_by_hashes(&ms_request, &extracted.histogram, &ms_query)?;
    assert!(response.candidate_query.starts_with("cl_ms:"));
    assert_eq!(response.hits[0].id.as_deref(), Some("img30"));

    let empty = searcher.search_by_hashes(&request, &extracted.histogram, "  ");
    assert!(matches!(empty, Err(ImgsimError::InvalidArgument(_))));
    Ok(())
}

#[test]
fn unknown_features_and_documents_are_errors() -> Result<()> {
    let searcher = build_searcher()?;
    let query = FeatureVector::Double(corpus_vector(1));

    let unknown = searcher.search_by_feature(&searcher.request().hash_field("zz_ha"), &query);
    assert!(matches!(unknown, Err(ImgsimError::UnknownField(_))));

    let missing = searcher.search_by_id(&searcher.request(), "no-such-image");
    assert!(missing.is_err());
    Ok(())
}

#[test]
fn expired_deadline_cancels_the_request() -> Result<()> {
    let searcher = build_searcher()?;
    let request = searcher.request().timeout(Duration::ZERO);
    thread::sleep(Duration::from_millis(2));

    let response = searcher.search_by_feature(&request, &FeatureVector::Double(corpus_vector(2)));
    assert!(matches!(response, Err(ImgsimError::Cancelled(_))));
    Ok(())
}

#[test]
fn random_documents_respect_filters() -> Result<()> {
    let searcher = build_searcher()?;
    let mut rng = StdRng::seed_from_u64(3);

    let request = searcher.request().filter(Filter::term(TITLE_FIELD, "even"));
    let hits = searcher.random_documents(&request, 6, &mut rng)?;
    assert_eq!(hits.len(), 6);
    assert!(hits.iter().all(|h| h.title.as_deref() == Some("even")));
    let mut docs: Vec<u32> = hits.iter().map(|h| h.doc).collect();
    docs.sort_unstable();
    docs.dedup();
    assert_eq!(docs.len(), 6);

    let all = searcher.random_documents(&searcher.request(), 500, &mut rng)?;
    assert_eq!(all.len(), CORPUS_SIZE);
    Ok(())
}
