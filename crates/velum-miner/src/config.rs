//! Configuration for the mining runtime
//!
//! All tunables live here: default difficulty, the worker dispatch
//! threshold, timeouts, and channel sizing. Presets cover production and
//! test use; `validate()` runs before the runtime starts.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pow::MAX_DIFFICULTY;

// ----------------------------------------------------------------------------
// Miner Configuration
// ----------------------------------------------------------------------------

/// Configuration for difficulty, execution placement, and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Difficulty applied when a request does not specify one
    pub default_difficulty: u8,

    /// Difficulty at or above which requests go to the worker context
    pub worker_threshold: u8,

    /// Timeout for inline and fallback mining
    pub inline_timeout: Duration,

    /// Timeout for worker-dispatched mining
    pub worker_timeout: Duration,

    /// Buffer size of the request channel toward the worker
    pub request_buffer_size: usize,

    /// Buffer size of the reply channel from the worker
    pub reply_buffer_size: usize,

    /// Buffer size of the status event channel toward the application
    pub status_buffer_size: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            default_difficulty: 16,                         // moderate spam resistance
            worker_threshold: 8,                            // cheap searches stay inline
            inline_timeout: Duration::from_millis(30_000),  // 30 seconds
            worker_timeout: Duration::from_millis(60_000),  // 60 seconds
            request_buffer_size: 16,
            reply_buffer_size: 64,                          // progress heartbeats are bursty
            status_buffer_size: 64,
        }
    }
}

impl MinerConfig {
    /// Create configuration optimized for testing: trivial default
    /// difficulty and short timeouts
    pub fn testing() -> Self {
        Self {
            default_difficulty: 2,
            inline_timeout: Duration::from_millis(2_000),
            worker_timeout: Duration::from_millis(5_000),
            ..Self::default()
        }
    }

    /// Builder method to set the default difficulty
    pub fn with_default_difficulty(mut self, difficulty: u8) -> Self {
        self.default_difficulty = difficulty;
        self
    }

    /// Builder method to set the worker dispatch threshold
    pub fn with_worker_threshold(mut self, threshold: u8) -> Self {
        self.worker_threshold = threshold;
        self
    }

    /// Builder method to set both mining timeouts
    pub fn with_timeouts(mut self, inline: Duration, worker: Duration) -> Self {
        self.inline_timeout = inline;
        self.worker_timeout = worker;
        self
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> Result<(), String> {
        if self.default_difficulty > MAX_DIFFICULTY {
            return Err(format!(
                "Default difficulty cannot exceed the identifier width of {} hex characters",
                MAX_DIFFICULTY
            ));
        }
        if self.inline_timeout.is_zero() {
            return Err("Inline timeout cannot be zero".to_string());
        }
        if self.worker_timeout.is_zero() {
            return Err("Worker timeout cannot be zero".to_string());
        }
        if self.inline_timeout > self.worker_timeout {
            return Err("Inline timeout cannot exceed the worker timeout".to_string());
        }
        if self.request_buffer_size == 0 {
            return Err("Request buffer size cannot be zero".to_string());
        }
        if self.reply_buffer_size == 0 {
            return Err("Reply buffer size cannot be zero".to_string());
        }
        if self.status_buffer_size == 0 {
            return Err("Status buffer size cannot be zero".to_string());
        }
        Ok(())
    }
}

/// Arc-wrapped configuration shared across tasks
pub type SharedMinerConfig = Arc<MinerConfig>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(MinerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_testing_config_is_valid_and_fast() {
        let config = MinerConfig::testing();
        assert!(config.validate().is_ok());
        assert!(config.inline_timeout < MinerConfig::default().inline_timeout);
        assert_eq!(config.default_difficulty, 2);
    }

    #[test]
    fn test_validation_rejects_excessive_difficulty() {
        let config = MinerConfig::default().with_default_difficulty(65);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_buffers() {
        let mut config = MinerConfig::default();
        config.request_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = MinerConfig::default();
        config.status_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_inverted_timeouts() {
        let config = MinerConfig::default()
            .with_timeouts(Duration::from_secs(60), Duration::from_secs(30));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_methods_compose() {
        let config = MinerConfig::default()
            .with_default_difficulty(12)
            .with_worker_threshold(10)
            .with_timeouts(Duration::from_secs(10), Duration::from_secs(20));

        assert_eq!(config.default_difficulty, 12);
        assert_eq!(config.worker_threshold, 10);
        assert_eq!(config.inline_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }
}
