//! Candidate queries sent to the index.

pub mod builder;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ImgsimError, Result};

pub use builder::QueryBuilder;

/// One exact-match term of a disjunctive candidate query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermClause {
    pub term: String,
    pub boost: f32,
}

impl TermClause {
    pub fn new<S: Into<String>>(term: S, boost: f32) -> Self {
        TermClause {
            term: term.into(),
            boost,
        }
    }

    /// Parse `term` or `term^boost`.
    pub fn parse(text: &str) -> Result<Self> {
        match text.rsplit_once('^') {
            Some((term, boost)) if !term.is_empty() => {
                let boost = boost.parse::<f32>().map_err(|e| {
                    ImgsimError::invalid_argument(format!("bad boost in {text:?}: {e}"))
                })?;
                Ok(TermClause::new(term, boost))
            }
            _ => Ok(TermClause::new(text, 1.0)),
        }
    }
}

/// Query selecting re-ranking candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateQuery {
    /// Every document is a candidate.
    MatchAll,
    /// Documents matching any clause on `field`; scored by the sum of the
    /// boosts of the matching clauses.
    Terms {
        field: String,
        clauses: Vec<TermClause>,
    },
}

impl CandidateQuery {
    pub fn is_match_all(&self) -> bool {
        matches!(self, CandidateQuery::MatchAll)
    }

    /// Parse whitespace separated `term[^boost]` clauses on one field.
    pub fn parse_terms(field: &str, text: &str) -> Result<Self> {
        let clauses = text
            .split_whitespace()
            .map(TermClause::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(CandidateQuery::Terms {
            field: field.to_string(),
            clauses,
        })
    }
}

impl fmt::Display for CandidateQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateQuery::MatchAll => write!(f, "*:*"),
            CandidateQuery::Terms { field, clauses } => {
                for (i, clause) in clauses.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{field}:{}^{}", clause.term, clause.boost)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(CandidateQuery::MatchAll.to_string(), "*:*");
        let query = CandidateQuery::Terms {
            field: "cl_ms".to_string(),
            clauses: vec![TermClause::new("R000001", 1.0), TermClause::new("R000007", 0.5)],
        };
        assert_eq!(query.to_string(), "cl_ms:R000001^1 cl_ms:R000007^0.5");
    }

    #[test]
    fn test_parse_terms() {
        let query = CandidateQuery::parse_terms("cl_ms", " R000001^1.0  R000002^0.75 ff ").unwrap();
        let CandidateQuery::Terms { field, clauses } = query else {
            panic!("expected a term query");
        };
        assert_eq!(field, "cl_ms");
        assert_eq!(
            clauses,
            vec![
                TermClause::new("R000001", 1.0),
                TermClause::new("R000002", 0.75),
                TermClause::new("ff", 1.0),
            ]
        );
        assert!(CandidateQuery::parse_terms("cl_ha", "ab^x").is_err());
    }
}
