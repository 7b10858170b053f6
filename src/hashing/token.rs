//! Searchable token types produced by the hashing schemes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ImgsimError, Result};

/// One BitSampling hash value.
///
/// Its term text is the lowercase hex of the 32 bit pattern (negative
/// values print in two's complement), used verbatim as an exact-match term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HashToken(pub i32);

impl HashToken {
    /// Term text of the token.
    pub fn term(&self) -> String {
        self.to_string()
    }

    /// Parse a term produced by [`HashToken::term`].
    pub fn parse(term: &str) -> Result<Self> {
        u32::from_str_radix(term, 16)
            .map(|bits| HashToken(bits as i32))
            .map_err(|e| ImgsimError::invalid_argument(format!("bad hash term {term:?}: {e}")))
    }
}

impl fmt::Display for HashToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

/// Space separated term texts, the form tokens are logged and indexed in.
pub fn tokens_to_string(tokens: &[HashToken]) -> String {
    tokens
        .iter()
        .map(HashToken::term)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index of a MetricSpaces reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferencePointId(pub u32);

impl ReferencePointId {
    /// Term text of the reference point, e.g. `R000042`.
    pub fn term(&self) -> String {
        self.to_string()
    }

    pub fn parse(term: &str) -> Result<Self> {
        term.strip_prefix('R')
            .and_then(|digits| digits.parse::<u32>().ok())
            .map(ReferencePointId)
            .ok_or_else(|| ImgsimError::invalid_argument(format!("bad reference point term {term:?}")))
    }
}

impl fmt::Display for ReferencePointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{:06}", self.0)
    }
}
