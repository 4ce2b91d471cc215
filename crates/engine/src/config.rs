//! Engine configuration.

use std::time::Duration;

/// Default bound on per-record lock waits.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(5);

/// Tunables shared by every service in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a caller waits for a record lock before failing `Busy`.
    pub lock_wait: Duration,
    /// Whether building the fulfillment coordinator runs commitment
    /// reconciliation first, repairing counters left by an unclean
    /// shutdown.
    pub reconcile_on_start: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_wait: DEFAULT_LOCK_WAIT,
            reconcile_on_start: false,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment, falling back to defaults.
    ///
    /// `DEPOT_LOCK_WAIT_MS` sets the lock wait in milliseconds (0 means
    /// fail `Busy` immediately when contended); `DEPOT_RECONCILE_ON_START`
    /// turns the startup reconciliation pass on.
    pub fn from_env() -> Self {
        let lock_wait = match std::env::var("DEPOT_LOCK_WAIT_MS") {
            Ok(raw) => parse_lock_wait(&raw).unwrap_or_else(|| {
                tracing::warn!(
                    value = %raw,
                    "DEPOT_LOCK_WAIT_MS is not a number; using default"
                );
                DEFAULT_LOCK_WAIT
            }),
            Err(_) => DEFAULT_LOCK_WAIT,
        };

        let reconcile_on_start = std::env::var("DEPOT_RECONCILE_ON_START")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        Self {
            lock_wait,
            reconcile_on_start,
        }
    }
}

fn parse_lock_wait(raw: &str) -> Option<Duration> {
    raw.trim().parse::<u64>().ok().map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_wait_parses_milliseconds() {
        assert_eq!(parse_lock_wait("250"), Some(Duration::from_millis(250)));
        assert_eq!(parse_lock_wait(" 0 "), Some(Duration::ZERO));
        assert_eq!(parse_lock_wait("fast"), None);
        assert_eq!(parse_lock_wait("-5"), None);
    }

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.lock_wait, Duration::from_secs(5));
        assert!(!config.reconcile_on_start);
    }
}
