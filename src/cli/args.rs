//! Command line argument parsing for the imgsim CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// imgsim - content based image retrieval tools
#[derive(Parser, Debug, Clone)]
#[command(name = "imgsim")]
#[command(about = "Hashing resources and feature tools for content based image retrieval")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct ImgsimArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Engine configuration file (JSON)
    #[arg(short, long, global = true, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl ImgsimArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }

    /// Default log filter for the verbosity level.
    pub fn log_filter(&self) -> &'static str {
        match self.verbosity() {
            0 => "error",
            1 => "warn",
            2 => "info",
            _ => "debug",
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the registered features and their fields
    Features,

    /// Generate and write a BitSampling hyperplane table
    #[command(name = "gen-bit-sampling")]
    GenBitSampling(GenBitSamplingArgs),

    /// Sample MetricSpaces reference points from a file of vectors
    #[command(name = "gen-reference-points")]
    GenReferencePoints(GenReferencePointsArgs),

    /// Print the hash terms of a feature vector
    Hash(HashArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct GenBitSamplingArgs {
    /// Output file
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Largest feature dimension the table hashes
    #[arg(long, default_value = "640")]
    pub dimensions: usize,

    /// Bits per hash token (at most 32)
    #[arg(long, default_value = "12")]
    pub bits: usize,

    /// Hash tokens per vector
    #[arg(long, default_value = "150")]
    pub bundles: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct GenReferencePointsArgs {
    /// Feature code, e.g. cl
    #[arg(value_name = "CODE")]
    pub code: String,

    /// Input file, one comma separated vector per line
    #[arg(value_name = "VECTORS")]
    pub input: PathBuf,

    /// Output file
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Number of reference points
    #[arg(short = 'n', long, default_value = "1000")]
    pub count: usize,

    /// Posting list length
    #[arg(short = 'l', long, default_value = "50")]
    pub posting_list_length: usize,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct HashArgs {
    /// Comma separated feature vector
    #[arg(value_name = "VECTOR", allow_hyphen_values = true)]
    pub vector: String,

    /// Feature, as code or hash field
    #[arg(long, default_value = "cl_ha")]
    pub field: String,

    /// Fraction of terms in the printed query
    #[arg(short, long, default_value = "0.33")]
    pub accuracy: f64,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_command() {
        let args = ImgsimArgs::try_parse_from([
            "imgsim", "-vv", "hash", "--field", "eh", "1,-2.5,0",
        ])
        .unwrap();
        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.log_filter(), "info");
        match args.command {
            Command::Hash(hash) => {
                assert_eq!(hash.field, "eh");
                assert_eq!(hash.vector, "1,-2.5,0");
                assert_eq!(hash.accuracy, 0.33);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_generators() {
        let args = ImgsimArgs::try_parse_from(["imgsim", "-q", "gen-bit-sampling", "out.bslh"]).unwrap();
        assert_eq!(args.verbosity(), 0);
        let Command::GenBitSampling(gen_args) = args.command else {
            panic!("expected gen-bit-sampling");
        };
        assert_eq!(
            (gen_args.dimensions, gen_args.bits, gen_args.bundles),
            (640, 12, 150)
        );

        let args = ImgsimArgs::try_parse_from([
            "imgsim", "gen-reference-points", "cl", "in.csv", "out.msrp", "-n", "20",
        ])
        .unwrap();
        let Command::GenReferencePoints(gen_args) = args.command else {
            panic!("expected gen-reference-points");
        };
        assert_eq!(gen_args.count, 20);
        assert_eq!(gen_args.posting_list_length, 50);
    }
}
