//! Error types for identity and verification operations.

use thiserror::Error;

/// Errors that can occur during crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed")]
    InvalidSignature,

    /// The public key is malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The secret key is malformed.
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// A public key entry rejected by `add_public_key` (spec §6.5).
    #[error("malformed key entry: {0}")]
    MalformedKeyEntry(String),

    /// No key on file for the given node id.
    #[error("unknown signer: node {0}")]
    UnknownSigner(u32),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
