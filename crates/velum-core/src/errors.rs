//! Error types for the velum protocol core
//!
//! Errors are grouped by domain and folded into the umbrella [`VelumError`]
//! so call sites can propagate with `?` regardless of which layer failed.
//! Foreign error details are carried as strings so every variant stays
//! cloneable across task boundaries.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Cryptographic Errors
// ----------------------------------------------------------------------------

/// Errors from key handling and the layer cipher
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKeyFormat,

    #[error("Key derivation failed")]
    KeyDerivationFailed,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}

// ----------------------------------------------------------------------------
// Event Errors
// ----------------------------------------------------------------------------

/// Errors from event construction, serialization, and validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Malformed event id")]
    MalformedId,

    #[error("Event id does not match its canonical serialization")]
    IdMismatch,

    #[error("Unexpected event kind: expected {expected}, got {actual}")]
    UnexpectedKind { expected: u16, actual: u16 },

    #[error("Malformed nonce tag")]
    MalformedNonceTag,

    #[error("Signing key does not match the event author")]
    SignerMismatch,

    #[error("Rumor author does not match the seal signer")]
    AuthorMismatch,
}

// ----------------------------------------------------------------------------
// Umbrella Error Type
// ----------------------------------------------------------------------------

/// Top-level error type for the velum protocol core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VelumError {
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl VelumError {
    /// Create a serialization error from any serializer failure
    pub fn serialization<T: Into<String>>(message: T) -> Self {
        VelumError::Event(EventError::Serialization(message.into()))
    }

    /// Create an invalid key format error
    pub fn invalid_key() -> Self {
        VelumError::Crypto(CryptoError::InvalidKeyFormat)
    }

    /// Create a signature verification error
    pub fn signature_error() -> Self {
        VelumError::Crypto(CryptoError::SignatureVerificationFailed)
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

/// Result type alias for velum core operations
pub type Result<T> = core::result::Result<T, VelumError>;

/// Explicitly named result alias for contexts with competing `Result` types
pub type VelumResult<T> = Result<T>;
