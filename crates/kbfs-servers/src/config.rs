//! Connection settings for the networked clients

use std::time::Duration;

/// Reconnect and request timing for remote peers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReliabilityConfig {
    /// First reconnect delay in milliseconds
    pub base_backoff_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds
    pub max_backoff_ms: u64,

    /// Per-request and per-dial timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            base_backoff_ms: 200,
            max_backoff_ms: 10_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl ReliabilityConfig {
    /// Delay before reconnect attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self.base_backoff_ms.saturating_mul(factor);
        Duration::from_millis(ms.min(self.max_backoff_ms))
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_capped() {
        let config = ReliabilityConfig::default();
        assert_eq!(config.backoff(0), Duration::from_millis(200));
        assert_eq!(config.backoff(1), Duration::from_millis(400));
        assert_eq!(config.backoff(3), Duration::from_millis(1_600));
        assert_eq!(config.backoff(20), Duration::from_millis(10_000));
        assert_eq!(config.backoff(u32::MAX), Duration::from_millis(10_000));
    }
}
