//! Global image features: vectors, stored encodings, distances and the
//! registry of supported feature types.

pub mod descriptor;
pub mod distance;
pub mod registry;
pub mod vector;

pub use descriptor::{FeatureDescriptor, FeatureExtractor};
pub use distance::DistanceMetric;
pub use registry::{FeatureRegistry, FeatureRegistryBuilder};
pub use vector::{FeatureVector, VectorKind};
