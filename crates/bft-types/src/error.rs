//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Binary (wire) encoding failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Binary (wire) decoding failed.
    #[error("decode error: {0}")]
    Decode(String),

    /// A hex-encoded field was malformed.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Result type for wire operations.
pub type Result<T> = std::result::Result<T, TypesError>;

impl From<bincode::Error> for TypesError {
    fn from(err: bincode::Error) -> Self {
        TypesError::Decode(err.to_string())
    }
}
