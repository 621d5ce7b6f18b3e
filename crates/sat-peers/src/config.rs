use sat_signal::SignalingConfig;

use crate::backoff::RetryPolicy;

/// Configuration for a [`PeerManager`](crate::PeerManager).
///
/// ```rust
/// use sat_peers::ManagerConfig;
///
/// let config = ManagerConfig::new().max_retries(5).auto_connect(false);
/// ```
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub(crate) signaling: SignalingConfig,
    pub(crate) retry: RetryPolicy,
    /// Connect to peers found by announce cycles.
    pub(crate) auto_connect: bool,
    /// Log every published event at `info` level.
    pub(crate) log_events: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self {
            signaling: SignalingConfig::new(),
            retry: RetryPolicy::default(),
            auto_connect: true,
            log_events: false,
        }
    }

    pub fn signaling(mut self, signaling: SignalingConfig) -> Self {
        self.signaling = signaling;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for changing only `retry.max_retries`.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn auto_connect(mut self, enabled: bool) -> Self {
        self.auto_connect = enabled;
        self
    }

    pub fn log_events(mut self, enabled: bool) -> Self {
        self.log_events = enabled;
        self
    }

    pub fn signaling_config(&self) -> &SignalingConfig {
        &self.signaling
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}
