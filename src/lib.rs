//! # imgsim
//!
//! Retrieval core for content based image search.
//!
//! ## Features
//!
//! - Registry of global image features and their index fields
//! - BitSampling and MetricSpaces hashing of feature vectors
//! - Candidate queries weighted by hash term document frequency
//! - Exact top-K re-ranking of candidates by feature distance
//! - Parallel document encoding for ingestion

pub mod cli;
pub mod config;
pub mod error;
pub mod feature;
pub mod hashing;
pub mod index;
pub mod ingest;
pub mod query;
pub mod rerank;
pub mod search;
pub mod statistics;
pub mod util;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
