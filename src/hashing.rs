//! Hashing schemes turning feature vectors into exact-match index terms.

pub mod bit_sampling;
pub mod metric_spaces;
pub mod resources;
pub mod token;

use std::fmt::Debug;

use crate::error::Result;
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::vector::FeatureVector;

pub use bit_sampling::BitSampling;
pub use metric_spaces::{MetricSpaces, ReferencePoints};
pub use resources::HashingResources;
pub use token::{HashToken, ReferencePointId, tokens_to_string};

/// A scheme producing the searchable text of one feature field.
pub trait HashingScheme: Send + Sync + Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the scheme can hash vectors of this feature type.
    fn supports(&self, descriptor: &FeatureDescriptor) -> bool;

    /// Index field the terms are stored in.
    fn field_name(&self, descriptor: &FeatureDescriptor) -> String;

    /// Whitespace separated terms to index for `vector`.
    fn index_terms(&self, descriptor: &FeatureDescriptor, vector: &FeatureVector) -> Result<String>;
}
