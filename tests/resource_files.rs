use std::fs;
use std::sync::Arc;

use imgsim::config::EngineConfig;
use imgsim::error::{ImgsimError, Result};
use imgsim::feature::{FeatureRegistry, FeatureVector};
use imgsim::hashing::{BitSampling, HashingResources, ReferencePoints};
use imgsim::index::MemoryIndex;
use imgsim::search::ImageSearcher;

fn sample_corpus() -> Vec<FeatureVector> {
    (0..20)
        .map(|i| FeatureVector::Double((0..8).map(|j| ((i * 3 + j * 5) % 7) as f64 + i as f64).collect()))
        .collect()
}

#[test]
fn saved_tables_load_back_through_the_config() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = FeatureRegistry::with_defaults();
    let cl = registry
        .by_code("cl")
        .ok_or_else(|| ImgsimError::unknown_field("cl"))?;

    let bs_path = dir.path().join("cl.bslh");
    let table = BitSampling::generate_random(8, 10, 20, 5)?;
    table.save(&bs_path)?;

    let ms_path = dir.path().join("cl.msrp");
    let corpus = sample_corpus();
    let points = ReferencePoints::sample(cl, &corpus, 6, 4, 9)?;
    points.save(&ms_path)?;

    let config_path = dir.path().join("engine.json");
    let config = serde_json::json!({
        "hashing": {
            "bit_sampling": bs_path,
            "metric_spaces": [ms_path],
        },
        "search": { "top_k": 5 },
    });
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    let config = EngineConfig::from_file(&config_path)?;
    assert_eq!(config.search.top_k, 5);
    let resources = HashingResources::load(&config.hashing, &registry)?;
    assert_eq!(resources.bit_sampling.bundles(), 20);
    assert_eq!(resources.metric_spaces.supported_codes(), vec!["cl"]);

    // Loaded tables hash exactly like the saved ones.
    let vector = &corpus[3];
    assert_eq!(resources.bit_sampling.generate(vector)?, table.generate(vector)?);

    let searcher = ImageSearcher::new(&config, registry, Arc::new(MemoryIndex::new()))?;
    assert_eq!(searcher.request().top_k, 5);
    let response = searcher.search_by_feature(&searcher.request(), vector)?;
    assert!(response.hits.is_empty());
    Ok(())
}

#[test]
fn missing_or_corrupt_tables_are_fatal() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let registry = FeatureRegistry::with_defaults();

    let mut config = EngineConfig::default();
    config.hashing.metric_spaces = vec![dir.path().join("missing.msrp")];
    let err = HashingResources::load(&config.hashing, &registry)
        .err()
        .ok_or_else(|| ImgsimError::other("missing table loaded"))?;
    assert!(err.is_fatal());

    let corrupt = dir.path().join("corrupt.bslh");
    fs::write(&corrupt, b"not a table")?;
    config.hashing.metric_spaces.clear();
    config.hashing.bit_sampling = Some(corrupt);
    let err = ImageSearcher::new(&config, registry, Arc::new(MemoryIndex::new()))
        .err()
        .ok_or_else(|| ImgsimError::other("corrupt table loaded"))?;
    assert!(err.is_fatal());
    Ok(())
}
