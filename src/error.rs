//! Error types for imgsim.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`ImgsimError`] enum. Variants are split by who can recover from them:
//!
//! - request scoped problems ([`ImgsimError::UnknownField`],
//!   [`ImgsimError::UnsupportedScheme`], [`ImgsimError::Index`],
//!   [`ImgsimError::Cancelled`]) abort a single search;
//! - [`ImgsimError::Resource`] is raised while loading hashing resources at
//!   startup and must stop the process from serving searches;
//! - [`ImgsimError::Serialization`] and [`ImgsimError::DimensionMismatch`]
//!   on a candidate document only skip that candidate during re-ranking.
//!
//! # Examples
//!
//! ```
//! use imgsim::error::{ImgsimError, Result};
//!
//! fn lookup(field: &str) -> Result<()> {
//!     Err(ImgsimError::unknown_field(field))
//! }
//!
//! assert_eq!(
//!     lookup("zz_ha").unwrap_err().to_string(),
//!     "Unknown field: zz_ha"
//! );
//! ```

use std::io;

use thiserror::Error;

/// The main error type for imgsim operations.
#[derive(Error, Debug)]
pub enum ImgsimError {
    /// I/O errors (resource files, config files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No feature descriptor is registered for the field.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The hashing scheme has no resources for the feature type.
    #[error("Unsupported hashing scheme: {0}")]
    UnsupportedScheme(String),

    /// Corrupt, missing or incompatible hashing resources.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Vector dimensions do not fit the operation.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Feature bytes could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the external candidate index.
    #[error("Index error: {0}")]
    Index(String),

    /// The request deadline passed.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invalid caller supplied argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases.
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error.
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with ImgsimError.
pub type Result<T> = std::result::Result<T, ImgsimError>;

impl ImgsimError {
    /// Create a new unknown field error.
    pub fn unknown_field<S: Into<String>>(field: S) -> Self {
        ImgsimError::UnknownField(field.into())
    }

    /// Create a new unsupported scheme error.
    pub fn unsupported_scheme<S: Into<String>>(msg: S) -> Self {
        ImgsimError::UnsupportedScheme(msg.into())
    }

    /// Create a new resource error.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Resource(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Serialization(msg.into())
    }

    /// Create a new index error.
    pub fn index<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Index(msg.into())
    }

    /// Create a new cancelled error.
    pub fn cancelled<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Cancelled(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        ImgsimError::InvalidArgument(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Other(format!("Not found: {}", msg.into()))
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ImgsimError::Other(msg.into())
    }

    /// Whether the error must stop the process from serving searches.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImgsimError::Resource(_))
    }
}
