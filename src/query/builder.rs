//! Token selection and candidate query construction.
//!
//! BitSampling queries keep the rarest hash terms of the query vector: the
//! fewer documents share a term, the more selective it is. `accuracy` sets
//! the fraction of terms used; at 0.9 and above hashing is skipped and every
//! document is re-ranked.

use crate::error::Result;
use crate::feature::descriptor::FeatureDescriptor;
use crate::feature::vector::FeatureVector;
use crate::hashing::metric_spaces::MetricSpaces;
use crate::query::{CandidateQuery, TermClause};
use crate::statistics::HashTermStatistics;

/// Lower bound of the accepted accuracy range.
pub const MIN_ACCURACY: f64 = 0.1;

/// Upper bound of the accepted accuracy range.
pub const MAX_ACCURACY: f64 = 1.0;

/// Accuracy from which a match-all query is used.
pub const MATCH_ALL_ACCURACY: f64 = 0.9;

/// Fewest terms a hash query keeps.
pub const MIN_QUERY_TERMS: usize = 3;

/// Builds candidate queries from hash terms.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    statistics: &'a HashTermStatistics,
}

impl<'a> QueryBuilder<'a> {
    pub fn new(statistics: &'a HashTermStatistics) -> Self {
        QueryBuilder { statistics }
    }

    /// Clamp to `[0.1, 1.0]`; NaN counts as the lower bound.
    pub fn clamp_accuracy(accuracy: f64) -> f64 {
        if accuracy.is_nan() {
            MIN_ACCURACY
        } else {
            accuracy.clamp(MIN_ACCURACY, MAX_ACCURACY)
        }
    }

    /// Order terms by ascending document frequency in `field`, stable for
    /// equal frequencies.
    ///
    /// With `drop_zero_frequency`, leading terms no document carries are
    /// removed as long as more than [`MIN_QUERY_TERMS`] remain.
    pub fn order_hashes<S: AsRef<str>>(
        &self,
        terms: &[S],
        field: &str,
        drop_zero_frequency: bool,
    ) -> Vec<String> {
        let mut ranked: Vec<(u32, &str)> = terms
            .iter()
            .map(|term| {
                let term = term.as_ref();
                (self.statistics.doc_freq(field, term), term)
            })
            .collect();
        ranked.sort_by_key(|&(freq, _)| freq);

        let mut start = 0;
        if drop_zero_frequency {
            while ranked.len() - start > MIN_QUERY_TERMS && ranked[start].0 == 0 {
                start += 1;
            }
        }

        ranked[start..]
            .iter()
            .map(|&(_, term)| term.to_string())
            .collect()
    }

    /// Terms kept out of `total` at `accuracy`: at least [`MIN_QUERY_TERMS`],
    /// at most `available`.
    pub fn query_length(total: usize, accuracy: f64, available: usize) -> usize {
        let wanted = (total as f64 * Self::clamp_accuracy(accuracy)).floor() as usize;
        wanted.max(MIN_QUERY_TERMS).min(available)
    }

    /// Disjunction of the rarest terms; match-all from
    /// [`MATCH_ALL_ACCURACY`].
    pub fn build_approximate_query<S: AsRef<str>>(
        &self,
        terms: &[S],
        field: &str,
        accuracy: f64,
    ) -> CandidateQuery {
        if Self::clamp_accuracy(accuracy) >= MATCH_ALL_ACCURACY {
            return CandidateQuery::MatchAll;
        }

        let ordered = self.order_hashes(terms, field, true);
        let length = Self::query_length(terms.len(), accuracy, ordered.len());
        CandidateQuery::Terms {
            field: field.to_string(),
            clauses: ordered
                .into_iter()
                .take(length)
                .map(|term| TermClause::new(term, 1.0))
                .collect(),
        }
    }

    /// Boosted query over the nearest reference points on the MetricSpaces
    /// field. Fails with `UnsupportedScheme` for feature types without
    /// reference points.
    pub fn build_metric_spaces_query(
        metric_spaces: &MetricSpaces,
        descriptor: &FeatureDescriptor,
        vector: &FeatureVector,
        accuracy: f64,
    ) -> Result<CandidateQuery> {
        if Self::clamp_accuracy(accuracy) >= MATCH_ALL_ACCURACY {
            return Ok(CandidateQuery::MatchAll);
        }
        let posting_list_length = metric_spaces.posting_list_length(descriptor)?;

        let length = Self::query_length(posting_list_length, accuracy, posting_list_length);
        let clauses = metric_spaces
            .boosted_terms(descriptor, vector, length)?
            .into_iter()
            .map(|(id, boost)| TermClause::new(id.term(), boost))
            .collect();

        Ok(CandidateQuery::Terms {
            field: descriptor.metric_spaces_field(),
            clauses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::distance::DistanceMetric;
    use crate::feature::vector::VectorKind;
    use crate::hashing::metric_spaces::ReferencePoints;
    use crate::index::{MemoryDocument, MemoryIndex};

    fn statistics() -> HashTermStatistics {
        // doc freqs: a=3, b=1, c=2, d=0, e=0
        let index = MemoryIndex::new();
        index.add(MemoryDocument::new("1").with_terms("cl_ha", "a b c")).unwrap();
        index.add(MemoryDocument::new("2").with_terms("cl_ha", "a c")).unwrap();
        index.add(MemoryDocument::new("3").with_terms("cl_ha", "a")).unwrap();
        let stats = HashTermStatistics::new();
        stats.ensure_populated(&index, "cl_ha").unwrap();
        stats
    }

    fn terms(list: &str) -> Vec<String> {
        list.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_order_hashes_by_rarity() {
        let stats = statistics();
        let builder = QueryBuilder::new(&stats);
        let ordered = builder.order_hashes(&terms("a d b c e"), "cl_ha", false);
        assert_eq!(ordered, terms("d e b c a"));

        let freqs: Vec<u32> = ordered.iter().map(|t| stats.doc_freq("cl_ha", t)).collect();
        assert!(freqs.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_order_hashes_drops_unknown_terms() {
        let stats = statistics();
        let builder = QueryBuilder::new(&stats);
        assert_eq!(
            builder.order_hashes(&terms("a d b c e"), "cl_ha", true),
            terms("b c a")
        );
        // never below three terms
        assert_eq!(
            builder.order_hashes(&terms("d e f a"), "cl_ha", true),
            terms("e f a")
        );
        assert_eq!(builder.order_hashes(&terms("d e"), "cl_ha", true), terms("d e"));
    }

    #[test]
    fn test_accuracy_clamp() {
        assert_eq!(QueryBuilder::clamp_accuracy(0.0), 0.1);
        assert_eq!(QueryBuilder::clamp_accuracy(-4.0), 0.1);
        assert_eq!(QueryBuilder::clamp_accuracy(7.0), 1.0);
        assert_eq!(QueryBuilder::clamp_accuracy(0.5), 0.5);
        assert_eq!(QueryBuilder::clamp_accuracy(f64::NAN), 0.1);
    }

    #[test]
    fn test_high_accuracy_matches_all() {
        let stats = statistics();
        let builder = QueryBuilder::new(&stats);
        assert!(builder.build_approximate_query(&terms("a b c"), "cl_ha", 0.9).is_match_all());
        assert!(builder.build_approximate_query(&terms("a b c"), "cl_ha", 3.0).is_match_all());
        assert!(!builder.build_approximate_query(&terms("a b c"), "cl_ha", 0.89).is_match_all());
    }

    #[test]
    fn test_approximate_query_length() {
        let stats = statistics();
        let builder = QueryBuilder::new(&stats);
        let many: Vec<String> = (0..20).map(|i| format!("t{i}")).collect();

        let CandidateQuery::Terms { field, clauses } =
            builder.build_approximate_query(&many, "cl_ha", 0.5)
        else {
            panic!("expected a term query");
        };
        assert_eq!(field, "cl_ha");
        assert_eq!(clauses.len(), 10);
        assert!(clauses.iter().all(|c| c.boost == 1.0));

        // accuracy below the minimum is clamped, floor(20 * 0.1) = 2 < 3
        let query = builder.build_approximate_query(&many, "cl_ha", 0.0);
        let CandidateQuery::Terms { clauses, .. } = query else {
            panic!("expected a term query");
        };
        assert_eq!(clauses.len(), 3);

        let query = builder.build_approximate_query(&terms("a b"), "cl_ha", 0.33);
        let CandidateQuery::Terms { clauses, .. } = query else {
            panic!("expected a term query");
        };
        assert_eq!(clauses.len(), 2);
    }

    #[test]
    fn test_metric_spaces_query() {
        let descriptor = FeatureDescriptor::new(
            "cl",
            "ColorLayout",
            VectorKind::DenseDouble,
            DistanceMetric::Euclidean,
        );
        let points = (0..20).map(|i| FeatureVector::Double(vec![i as f64])).collect();
        let table = ReferencePoints::new(&descriptor, points, 10).unwrap();
        let ms = MetricSpaces::from_tables([table]).unwrap();
        let vector = FeatureVector::Double(vec![0.0]);

        let query = QueryBuilder::build_metric_spaces_query(&ms, &descriptor, &vector, 0.5).unwrap();
        let CandidateQuery::Terms { field, clauses } = query else {
            panic!("expected a term query");
        };
        assert_eq!(field, "cl_ms");
        assert_eq!(clauses.len(), 5);
        assert_eq!(clauses[0], TermClause::new("R000000", 1.0));
        assert!(clauses.windows(2).all(|w| w[0].boost > w[1].boost));

        let query = QueryBuilder::build_metric_spaces_query(&ms, &descriptor, &vector, 0.1).unwrap();
        let CandidateQuery::Terms { clauses, .. } = query else {
            panic!("expected a term query");
        };
        assert_eq!(clauses.len(), 3);

        let query = QueryBuilder::build_metric_spaces_query(&ms, &descriptor, &vector, 0.95).unwrap();
        assert!(query.is_match_all());

        let other = FeatureDescriptor::new("eh", "EdgeHistogram", VectorKind::DenseDouble, DistanceMetric::Manhattan);
        assert!(QueryBuilder::build_metric_spaces_query(&ms, &other, &vector, 0.5).is_err());
    }
}
