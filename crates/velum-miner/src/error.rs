//! Error types for the mining runtime
//!
//! Every variant is cloneable so errors can travel through reply channels
//! and be fanned out to status observers. Cancellation is deliberately not
//! an error; it is a normal outcome of a mining request.

use thiserror::Error;
use velum_core::VelumError;

// ----------------------------------------------------------------------------
// Miner Errors
// ----------------------------------------------------------------------------

/// Errors surfaced by mining requests
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MinerError {
    /// Malformed key material or a failed envelope layer. Fatal for the
    /// request; never retried.
    #[error(transparent)]
    KeyDerivation(#[from] VelumError),

    /// A configured timeout or the hard search ceiling expired
    #[error(
        "Mining timed out after {elapsed_ms}ms at difficulty {difficulty}; \
         lower the difficulty and try again"
    )]
    MiningTimeout { difficulty: u8, elapsed_ms: u64 },

    /// Dispatch to the worker failed before any mining began
    #[error("Mining worker unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    /// The worker link was torn down while the request was still pending
    #[error("Worker channel closed with the request still pending")]
    ChannelClosed,

    /// The runtime configuration failed validation
    #[error("Invalid miner configuration: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl MinerError {
    /// Create a worker unavailable error
    pub fn worker_unavailable<T: Into<String>>(reason: T) -> Self {
        MinerError::WorkerUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<T: Into<String>>(reason: T) -> Self {
        MinerError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether an inline retry can still succeed after this error
    pub fn allows_inline_fallback(&self) -> bool {
        matches!(self, MinerError::WorkerUnavailable { .. })
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

/// Result type alias for mining operations
pub type MinerResult<T> = core::result::Result<T, MinerError>;
