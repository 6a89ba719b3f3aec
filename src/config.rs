//! Engine configuration.
//!
//! Tuning knobs for the runtime's retry cadence and pooling. All values have
//! conservative defaults; most embeddings never need to change them.

use std::time::Duration;

// =============================================================================
// Configuration Constants
// =============================================================================

/// Default backoff between delivery/turn retries.
///
/// Retries are the engine's only wait primitive: a chain that finds a
/// downstream slot busy, or that is not yet the output turn, re-schedules
/// itself after this delay instead of blocking a worker thread.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_micros(50);

/// Default polling interval of the `sync()` barrier.
pub const DEFAULT_SYNC_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Default cap on idle fence objects retained by the pool.
pub const DEFAULT_FENCE_POOL_MAX_IDLE: usize = 8;

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for a [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Backoff between delivery and output-turn retries.
    pub retry_backoff: Duration,

    /// Polling interval of the `sync()` barrier.
    pub sync_poll_interval: Duration,

    /// Idle fence objects retained by the pool before trimming.
    pub fence_pool_max_idle: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            sync_poll_interval: DEFAULT_SYNC_POLL_INTERVAL,
            fence_pool_max_idle: DEFAULT_FENCE_POOL_MAX_IDLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_backoff, DEFAULT_RETRY_BACKOFF);
        assert_eq!(config.sync_poll_interval, DEFAULT_SYNC_POLL_INTERVAL);
        assert_eq!(config.fence_pool_max_idle, DEFAULT_FENCE_POOL_MAX_IDLE);
    }

    #[test]
    fn test_engine_config_clone() {
        let config = EngineConfig {
            retry_backoff: Duration::from_micros(10),
            ..Default::default()
        };
        let cloned = config.clone();
        assert_eq!(cloned.retry_backoff, Duration::from_micros(10));
    }
}
