//! Command implementations for the imgsim CLI.

use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::EngineConfig;
use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::registry::FeatureRegistry;
use crate::feature::vector::FeatureVector;
use crate::hashing::token::HashToken;
use crate::hashing::{BitSampling, HashingResources, ReferencePoints};
use crate::query::QueryBuilder;

/// Execute a CLI command.
pub fn execute_command(args: ImgsimArgs) -> Result<()> {
    let registry = FeatureRegistry::with_defaults();
    match &args.command {
        Command::Features => list_features(&registry, &args),
        Command::GenBitSampling(gen_args) => gen_bit_sampling(gen_args, &args),
        Command::GenReferencePoints(gen_args) => gen_reference_points(gen_args, &registry, &args),
        Command::Hash(hash_args) => hash_vector(hash_args, &registry, &args),
    }
}

fn load_config(args: &ImgsimArgs) -> Result<EngineConfig> {
    match &args.config {
        Some(path) => EngineConfig::from_file(path),
        None => Ok(EngineConfig::default()),
    }
}

fn list_features(registry: &FeatureRegistry, args: &ImgsimArgs) -> Result<()> {
    if args.output_format == OutputFormat::Human {
        print!("{registry}");
        return Ok(());
    }

    let entries: Vec<FeatureEntry> = registry
        .descriptors()
        .iter()
        .map(|d| FeatureEntry {
            code: d.code().to_string(),
            name: d.name().to_string(),
            kind: d.kind().name().to_string(),
            metric: d.metric().name().to_string(),
            histogram_field: d.histogram_field(),
            hash_field: d.hash_field(),
            metric_spaces_field: d.metric_spaces_field(),
        })
        .collect();
    output_result("Registered features", &entries, args)
}

fn gen_bit_sampling(gen_args: &GenBitSamplingArgs, args: &ImgsimArgs) -> Result<()> {
    let table = BitSampling::generate_random(
        gen_args.dimensions,
        gen_args.bits,
        gen_args.bundles,
        gen_args.seed,
    )?;
    table.save(&gen_args.output)?;
    info!(path = %gen_args.output.display(), "wrote BitSampling table");

    output_result(
        "BitSampling table written",
        &BitSamplingResult {
            path: gen_args.output.display().to_string(),
            dimensions: table.dimensions(),
            bits: table.bits(),
            bundles: table.bundles(),
            seed: gen_args.seed,
        },
        args,
    )
}

fn gen_reference_points(
    gen_args: &GenReferencePointsArgs,
    registry: &FeatureRegistry,
    args: &ImgsimArgs,
) -> Result<()> {
    let descriptor = registry
        .by_code(&gen_args.code)
        .ok_or_else(|| ImgsimError::unknown_field(gen_args.code.clone()))?;
    let corpus = read_vectors(&gen_args.input, descriptor)?;
    let table = ReferencePoints::sample(
        descriptor,
        &corpus,
        gen_args.count,
        gen_args.posting_list_length,
        gen_args.seed,
    )?;
    table.save(&gen_args.output)?;

    output_result(
        "Reference points written",
        &ReferencePointsResult {
            path: gen_args.output.display().to_string(),
            code: table.code().to_string(),
            sampled_from: corpus.len(),
            points: table.len(),
            posting_list_length: table.posting_list_length(),
        },
        args,
    )
}

fn hash_vector(hash_args: &HashArgs, registry: &FeatureRegistry, args: &ImgsimArgs) -> Result<()> {
    let config = load_config(args)?;
    let field = FeatureRegistry::normalize_hash_field(&hash_args.field);
    let descriptor = registry.require_hash_field(&field)?;
    let vector = parse_vector(descriptor, &hash_args.vector)?;
    let resources = HashingResources::load(&config.hashing, registry)?;

    let bit_sampling: Vec<String> = resources
        .bit_sampling
        .generate(&vector)?
        .iter()
        .map(HashToken::term)
        .collect();
    let length = QueryBuilder::query_length(
        bit_sampling.len(),
        hash_args.accuracy,
        bit_sampling.len(),
    );
    let bit_sampling_query = bit_sampling[..length].join(" ");

    let (metric_spaces, metric_spaces_query) = if resources.metric_spaces.supports(descriptor) {
        let list = resources
            .metric_spaces
            .generate(descriptor, &vector)?
            .iter()
            .map(|id| id.term())
            .collect::<Vec<_>>();
        let length = QueryBuilder::query_length(list.len(), hash_args.accuracy, list.len());
        let query = resources
            .metric_spaces
            .boosted_terms(descriptor, &vector, length)?
            .iter()
            .map(|(id, boost)| format!("{id}^{boost}"))
            .collect::<Vec<_>>()
            .join(" ");
        (Some(list), Some(query))
    } else {
        (None, None)
    };

    output_result(
        "Hash terms",
        &HashResult {
            field,
            dimensions: vector.len(),
            bit_sampling,
            bit_sampling_query,
            metric_spaces,
            metric_spaces_query,
        },
        args,
    )
}

/// Parse a comma separated vector into the descriptor's element type.
pub fn parse_vector(descriptor: &FeatureDescriptor, text: &str) -> Result<FeatureVector> {
    let parts = text.split(',').map(str::trim).filter(|s| !s.is_empty());
    if descriptor.kind().is_short() {
        parts
            .map(|s| {
                s.parse::<i16>().map_err(|e| {
                    ImgsimError::invalid_argument(format!("bad {} value {s:?}: {e}", descriptor.code()))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(FeatureVector::Short)
    } else {
        parts
            .map(|s| {
                s.parse::<f64>().map_err(|e| {
                    ImgsimError::invalid_argument(format!("bad {} value {s:?}: {e}", descriptor.code()))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(FeatureVector::Double)
    }
}

fn read_vectors(path: &Path, descriptor: &FeatureDescriptor) -> Result<Vec<FeatureVector>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read vectors from {}", path.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_vector(descriptor, line))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector() {
        let registry = FeatureRegistry::with_defaults();
        let cl = registry.by_code("cl").unwrap();
        assert_eq!(
            parse_vector(cl, "1, -2.5,0").unwrap(),
            FeatureVector::Double(vec![1.0, -2.5, 0.0])
        );
        let sf = registry.by_code("sf").unwrap();
        assert_eq!(
            parse_vector(sf, "0,3,0,-7").unwrap(),
            FeatureVector::Short(vec![0, 3, 0, -7])
        );
        assert!(parse_vector(sf, "1.5").is_err());
        assert!(parse_vector(cl, "a,b").is_err());
    }

    #[test]
    fn test_read_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.csv");
        fs::write(&path, "1,2\n\n3,4\n").unwrap();
        let registry = FeatureRegistry::with_defaults();
        let vectors = read_vectors(&path, registry.by_code("cl").unwrap()).unwrap();
        assert_eq!(vectors.len(), 2);

        let missing = read_vectors(&dir.path().join("missing.csv"), registry.by_code("cl").unwrap());
        assert!(matches!(missing, Err(ImgsimError::Anyhow(_))));
    }
}
