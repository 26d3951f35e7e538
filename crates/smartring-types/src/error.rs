//! Error types for value parsing in smartring-types.

use thiserror::Error;

/// Errors that can occur when parsing smart ring values from text.
///
/// This error type is platform-agnostic and does not include
/// transport errors (those belong in smartring-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value was present but could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// An unrecognised sleep stage label.
    #[error("Unknown sleep stage: {0}")]
    UnknownStage(String),
}

/// Result type alias using smartring-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
