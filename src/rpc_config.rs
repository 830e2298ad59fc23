//! Public, transport-agnostic RPC configuration.
//!
//! This type intentionally contains no transport-specific concepts. The
//! client reads the request timeout; the server reads the work duration and
//! checkpoint interval.

use std::time::Duration;

use crate::{Result, RpcError, DEFAULT_CHECK_INTERVAL};

/// Default simulated work per sum call.
pub const DEFAULT_WORK_DURATION: Duration = Duration::from_secs(2);

/// Environment variable overriding [`RpcConfig::work_duration`] (milliseconds).
pub const ENV_WORK_MS: &str = "INCREMENTER_WORK_MS";
/// Environment variable overriding [`RpcConfig::check_interval`] (milliseconds).
pub const ENV_CHECK_INTERVAL_MS: &str = "INCREMENTER_CHECK_INTERVAL_MS";
/// Environment variable setting [`RpcConfig::request_timeout`] (milliseconds).
pub const ENV_REQUEST_TIMEOUT_MS: &str = "INCREMENTER_REQUEST_TIMEOUT_MS";

/// Client and server configuration.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    // ---
    /// Unique identifier for this node, used for addressing and logging.
    pub transport_id: String,

    /// Local limit on how long a client waits for a response.
    ///
    /// `None` (the default) waits until the server answers, the call is
    /// cancelled, or the connection fails. There is no retry either way.
    pub request_timeout: Option<Duration>,

    /// Simulated work the server performs per call.
    ///
    /// Default: 2 seconds
    pub work_duration: Duration,

    /// Distance between cancellation checkpoints of interruptible calls.
    ///
    /// Default: 100 milliseconds
    pub check_interval: Duration,
}

impl RpcConfig {
    /// Create a memory transport config.
    pub fn memory(transport_id: impl Into<String>) -> Self {
        Self {
            transport_id: transport_id.into(),
            request_timeout: None,
            work_duration: DEFAULT_WORK_DURATION,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Memory config with overrides read from the `INCREMENTER_*` variables.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::MissingConfig` if a variable is set but is not a
    /// whole number of milliseconds.
    pub fn from_env(transport_id: impl Into<String>) -> Result<Self> {
        let mut config = Self::memory(transport_id);
        if let Some(d) = env_millis(ENV_WORK_MS)? {
            config.work_duration = d;
        }
        if let Some(d) = env_millis(ENV_CHECK_INTERVAL_MS)? {
            config.check_interval = d;
        }
        config.request_timeout = env_millis(ENV_REQUEST_TIMEOUT_MS)?;
        Ok(config)
    }

    /// Set the local request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the simulated work duration.
    pub fn with_work_duration(mut self, duration: Duration) -> Self {
        self.work_duration = duration;
        self
    }

    /// Set the checkpoint interval for interruptible calls.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|err| RpcError::MissingConfig(format!("{name}={raw:?}: {err}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_memory_defaults() {
        // ---
        let config = RpcConfig::memory("node");
        assert_eq!(config.transport_id, "node");
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.work_duration, DEFAULT_WORK_DURATION);
        assert_eq!(config.check_interval, DEFAULT_CHECK_INTERVAL);
    }

    #[test]
    fn test_builders_override() {
        // ---
        let config = RpcConfig::memory("node")
            .with_request_timeout(Duration::from_secs(3))
            .with_work_duration(Duration::from_millis(500))
            .with_check_interval(Duration::from_millis(50));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(config.work_duration, Duration::from_millis(500));
        assert_eq!(config.check_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_unset_variable_reads_as_none() {
        // ---
        assert!(env_millis("INCREMENTER_TEST_SURELY_UNSET_VARIABLE")
            .unwrap()
            .is_none());
    }
}
