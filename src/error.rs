//! Error types for catalog loading, material parsing and run setup.
//!
//! Part-level problems (an oversized panel, an unknown core) are not errors:
//! they end up as [`crate::types::UnplacedPart`] records or warnings in the
//! run log. Only problems that make a whole run meaningless surface here.

use thiserror::Error;

/// Errors produced while parsing a material string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The string was empty or whitespace.
    #[error("empty material string")]
    Empty,

    /// The string did not split into one or three components.
    #[error("invalid material string format: '{input}'")]
    Format { input: String },

    /// The core component was empty after trimming.
    #[error("could not extract core name from '{input}'")]
    MissingCore { input: String },
}

/// Run-level errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlacementError {
    /// The catalog holds no core materials.
    #[error("material catalog is empty")]
    EmptyCatalog,

    /// A catalog entry has values no board can be built from.
    #[error("invalid catalog entry '{name}': {reason}")]
    InvalidCatalogEntry { name: String, reason: String },

    /// The upgrade sequence names unknown or duplicate cores.
    #[error("invalid upgrade sequence: {0}")]
    InvalidUpgradeSequence(String),

    /// Kerf must be finite and non-negative.
    #[error("invalid kerf: {0}")]
    InvalidKerf(f64),

    /// A part's material string could not be parsed.
    #[error("part '{part}': {source}")]
    Material {
        part: String,
        #[source]
        source: ParseError,
    },

    /// A part request has unusable dimensions or quantity.
    #[error("part '{part}': {reason}")]
    InvalidPart { part: String, reason: String },
}

/// Result type alias for run-level operations.
pub type Result<T> = std::result::Result<T, PlacementError>;
