//! Output formatting for CLI commands.

use serde::Serialize;

use crate::cli::args::{ImgsimArgs, OutputFormat};
use crate::error::Result;

/// One registered feature.
#[derive(Debug, Serialize)]
pub struct FeatureEntry {
    pub code: String,
    pub name: String,
    pub kind: String,
    pub metric: String,
    pub histogram_field: String,
    pub hash_field: String,
    pub metric_spaces_field: String,
}

/// Result of writing a BitSampling table.
#[derive(Debug, Serialize)]
pub struct BitSamplingResult {
    pub path: String,
    pub dimensions: usize,
    pub bits: usize,
    pub bundles: usize,
    pub seed: u64,
}

/// Result of writing a reference point table.
#[derive(Debug, Serialize)]
pub struct ReferencePointsResult {
    pub path: String,
    pub code: String,
    pub sampled_from: usize,
    pub points: usize,
    pub posting_list_length: usize,
}

/// Hash terms of one vector.
#[derive(Debug, Serialize)]
pub struct HashResult {
    pub field: String,
    pub dimensions: usize,
    pub bit_sampling: Vec<String>,
    pub bit_sampling_query: String,
    pub metric_spaces: Option<Vec<String>>,
    pub metric_spaces_query: Option<String>,
}

/// Output a command result in the requested format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &ImgsimArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

fn output_human<T: Serialize>(message: &str, result: &T, args: &ImgsimArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }
    let value = serde_json::to_value(result)?;
    print_value(&value, 0);
    Ok(())
}

fn print_value(value: &serde_json::Value, indent: usize) {
    let pad = "  ".repeat(indent);
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                match value {
                    serde_json::Value::Object(_) => {
                        println!("{pad}{key}:");
                        print_value(value, indent + 1);
                    }
                    serde_json::Value::Array(items) if items.iter().all(|v| !v.is_object()) => {
                        let items: Vec<String> = items.iter().map(scalar).collect();
                        println!("{pad}{key}: {}", items.join(" "));
                    }
                    serde_json::Value::Array(items) => {
                        println!("{pad}{key}:");
                        for item in items {
                            print_value(item, indent + 1);
                            println!();
                        }
                    }
                    other => println!("{pad}{key}: {}", scalar(other)),
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                print_value(item, indent);
                println!();
            }
        }
        other => println!("{pad}{}", scalar(other)),
    }
}

fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

fn output_json<T: Serialize>(result: &T, args: &ImgsimArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    println!("{json}");
    Ok(())
}
