//! Distance of indexed documents to a fixed reference feature.
//!
//! Usable as a sort or function value outside of re-ranking, e.g. to order
//! an arbitrary document list by visual similarity.

use crate::error::Result;
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::registry::FeatureRegistry;
use crate::feature::vector::FeatureVector;
use crate::index::{CandidateIndex, DocId};

#[derive(Debug, Clone)]
pub struct FeatureDistanceFunction {
    descriptor: FeatureDescriptor,
    reference: FeatureVector,
    max_distance: f64,
}

impl FeatureDistanceFunction {
    /// `histogram_field` names the feature (e.g. `cl_hi`); `bytes` is the
    /// reference feature in that field's encoding. Documents without a usable
    /// feature evaluate to `max_distance` (`f64::MAX` when absent).
    pub fn new(
        registry: &FeatureRegistry,
        histogram_field: &str,
        bytes: &[u8],
        max_distance: Option<f64>,
    ) -> Result<Self> {
        let descriptor = registry.require_histogram_field(histogram_field)?.clone();
        let reference = descriptor.decode(bytes)?;
        Ok(FeatureDistanceFunction {
            descriptor,
            reference,
            max_distance: max_distance.unwrap_or(f64::MAX),
        })
    }

    pub fn descriptor(&self) -> &FeatureDescriptor {
        &self.descriptor
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Distance of `doc` to the reference feature.
    pub fn evaluate<I>(&self, index: &I, doc: DocId) -> Result<f64>
    where
        I: CandidateIndex + ?Sized,
    {
        let Some(bytes) = index.feature_bytes(doc, &self.descriptor.histogram_field())? else {
            return Ok(self.max_distance);
        };
        let distance = self
            .descriptor
            .decode(&bytes)
            .and_then(|feature| self.descriptor.distance(&self.reference, &feature));
        Ok(distance.unwrap_or(self.max_distance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{MemoryDocument, MemoryIndex};

    #[test]
    fn test_evaluate() {
        let registry = FeatureRegistry::with_defaults();
        let descriptor = registry.by_code("eh").unwrap();
        let encode = |values: Vec<f64>| descriptor.encode(&FeatureVector::Double(values)).unwrap();

        let index = MemoryIndex::new();
        let near = index
            .add(MemoryDocument::new("near").with_binary("eh_hi", encode(vec![1.0, 1.0])))
            .unwrap();
        let bare = index.add(MemoryDocument::new("bare")).unwrap();
        let odd = index
            .add(MemoryDocument::new("odd").with_binary("eh_hi", encode(vec![1.0])))
            .unwrap();

        let function =
            FeatureDistanceFunction::new(&registry, "eh_hi", &encode(vec![0.0, 3.0]), Some(99.0))
                .unwrap();
        assert_eq!(function.evaluate(&index, near).unwrap(), 3.0);
        assert_eq!(function.evaluate(&index, bare).unwrap(), 99.0);
        assert_eq!(function.evaluate(&index, odd).unwrap(), 99.0);

        let unbounded = FeatureDistanceFunction::new(&registry, "eh_hi", &encode(vec![0.0, 3.0]), None).unwrap();
        assert_eq!(unbounded.evaluate(&index, bare).unwrap(), f64::MAX);
        assert!(FeatureDistanceFunction::new(&registry, "zz_hi", &[], None).is_err());
    }
}
