//! Exact re-ranking of candidate documents.
//!
//! Candidates come back from the index in hash-match order. Each one is
//! decoded, compared to the query feature and offered to a
//! [`TopKCollector`], a bounded max-heap whose top is the worst retained
//! result. A better candidate overwrites the top in place, so memory stays
//! at `k` entries and the cost is O(N log K).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::error::{ImgsimError, Result};
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::vector::FeatureVector;
use crate::index::{CandidateIndex, DocId};

/// Candidates between two deadline checks.
pub const DEADLINE_CHECK_INTERVAL: usize = 256;

/// A retained candidate.
///
/// Ordered by distance, then by arrival sequence, so that among equally
/// distant documents the earlier candidate ranks first.
#[derive(Debug, Clone, Copy)]
pub struct RankedResult {
    pub distance: f64,
    pub doc: DocId,
    pub sequence: u64,
}

impl PartialEq for RankedResult {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedResult {}

impl PartialOrd for RankedResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

/// Keeps the `k` smallest results offered to it.
#[derive(Debug, Clone)]
pub struct TopKCollector {
    k: usize,
    /// Max-heap: the top is the worst retained result.
    heap: BinaryHeap<RankedResult>,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            k,
            heap: BinaryHeap::with_capacity(k),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Whether `k` results are retained.
    pub fn is_saturated(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Distance of the worst retained result once saturated.
    pub fn worst_distance(&self) -> Option<f64> {
        if self.is_saturated() {
            self.heap.peek().map(|r| r.distance)
        } else {
            None
        }
    }

    /// Offer a candidate; returns whether it was retained.
    ///
    /// A saturated collector only accepts results strictly better than its
    /// worst one, which is then overwritten.
    pub fn offer(&mut self, distance: f64, doc: DocId, sequence: u64) -> bool {
        let candidate = RankedResult {
            distance,
            doc,
            sequence,
        };
        if self.k == 0 {
            return false;
        }
        if self.heap.len() < self.k {
            self.heap.push(candidate);
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut worst) if candidate < *worst => {
                *worst = candidate;
                true
            }
            _ => false,
        }
    }

    /// Fold another collector into this one.
    pub fn merge(&mut self, other: TopKCollector) {
        for result in other.heap.into_vec() {
            self.offer(result.distance, result.doc, result.sequence);
        }
    }

    /// Retained results, best first.
    pub fn into_sorted_vec(self) -> Vec<RankedResult> {
        self.heap.into_sorted_vec()
    }
}

/// Outcome of a re-ranking pass.
#[derive(Debug, Clone, Default)]
pub struct RerankOutcome {
    /// Best results first.
    pub results: Vec<RankedResult>,
    /// Candidates without a usable feature.
    pub skipped: usize,
}

/// Computes exact distances over candidate sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReRanker;

impl ReRanker {
    /// Re-rank candidates on the calling thread.
    pub fn rerank<I>(
        query: &FeatureVector,
        descriptor: &FeatureDescriptor,
        candidates: &[DocId],
        index: &I,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<RerankOutcome>
    where
        I: CandidateIndex + ?Sized,
    {
        let mut collector = TopKCollector::new(k);
        let skipped = rerank_chunk(
            query,
            descriptor,
            candidates,
            0,
            index,
            deadline,
            &mut collector,
        )?;
        Ok(RerankOutcome {
            results: collector.into_sorted_vec(),
            skipped,
        })
    }

    /// Re-rank candidates on the rayon pool.
    ///
    /// Chunks keep their global arrival sequences, so the result is the one
    /// [`ReRanker::rerank`] returns.
    pub fn rerank_parallel<I>(
        query: &FeatureVector,
        descriptor: &FeatureDescriptor,
        candidates: &[DocId],
        index: &I,
        k: usize,
        deadline: Option<Instant>,
    ) -> Result<RerankOutcome>
    where
        I: CandidateIndex + ?Sized,
    {
        let chunk_size = (candidates.len() / (rayon::current_num_threads() * 4))
            .max(DEADLINE_CHECK_INTERVAL);

        let partials = candidates
            .par_chunks(chunk_size)
            .enumerate()
            .map(|(chunk, docs)| {
                let mut collector = TopKCollector::new(k);
                let skipped = rerank_chunk(
                    query,
                    descriptor,
                    docs,
                    (chunk * chunk_size) as u64,
                    index,
                    deadline,
                    &mut collector,
                )?;
                Ok((collector, skipped))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut merged = TopKCollector::new(k);
        let mut skipped = 0;
        for (collector, chunk_skipped) in partials {
            merged.merge(collector);
            skipped += chunk_skipped;
        }
        debug!(
            candidates = candidates.len(),
            chunk_size, skipped, "parallel re-ranking finished"
        );

        Ok(RerankOutcome {
            results: merged.into_sorted_vec(),
            skipped,
        })
    }
}

/// Offer every candidate of a chunk; returns how many were skipped.
fn rerank_chunk<I>(
    query: &FeatureVector,
    descriptor: &FeatureDescriptor,
    docs: &[DocId],
    first_sequence: u64,
    index: &I,
    deadline: Option<Instant>,
    collector: &mut TopKCollector,
) -> Result<usize>
where
    I: CandidateIndex + ?Sized,
{
    let histogram_field = descriptor.histogram_field();
    let mut scratch = descriptor.kind().empty_vector();
    let mut skipped = 0;

    for (i, &doc) in docs.iter().enumerate() {
        if i % DEADLINE_CHECK_INTERVAL == 0 && deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ImgsimError::cancelled("deadline expired during re-ranking"));
        }

        let Some(bytes) = index.feature_bytes(doc, &histogram_field)? else {
            warn!(doc, field = %histogram_field, "candidate has no stored feature");
            skipped += 1;
            continue;
        };
        if let Err(e) = descriptor.decode_into(&bytes, &mut scratch) {
            warn!(doc, error = %e, "cannot decode candidate feature");
            skipped += 1;
            continue;
        }
        match descriptor.distance(query, &scratch) {
            Ok(distance) => {
                collector.offer(distance, doc, first_sequence + i as u64);
            }
            Err(e) => {
                warn!(doc, error = %e, "cannot compare candidate feature");
                skipped += 1;
            }
        }
    }

    Ok(skipped)
}
