use std::time::Duration;

use crate::endpoint::{parse_endpoints, AnnounceEndpoint};

/// Public WebTorrent trackers used when nothing else is configured.
pub const DEFAULT_ANNOUNCE_URLS: &[&str] = &[
    "wss://tracker.openwebtorrent.com",
    "wss://tracker.btorrent.xyz",
    "wss://tracker.webtorrent.dev",
];

/// Swarm key announced as `info_hash` when none is configured.
pub const DEFAULT_SWARM: &str = "sat-mesh";

/// Configuration for a [`SignalingClient`](crate::SignalingClient).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use sat_signal::SignalingConfig;
///
/// let config = SignalingConfig::new()
///     .swarm("my-room")
///     .request_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Ordered announce endpoints.
    pub(crate) endpoints: Vec<AnnounceEndpoint>,
    /// Swarm key sent as `info_hash`.
    pub(crate) swarm: String,
    /// Upper bound for a single tracker request.
    pub(crate) request_timeout: Duration,
    /// Minimum delay between announce cycles.
    pub(crate) announce_interval: Duration,
    /// Number of peers requested per announce.
    pub(crate) numwant: u32,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingConfig {
    /// Create a new config with defaults.
    ///
    /// If the `SAT_ANNOUNCE_URLS` environment variable is set (comma
    /// separated), it replaces the default tracker list. Entries that fail to
    /// parse are skipped with a warning.
    pub fn new() -> Self {
        let endpoints = std::env::var("SAT_ANNOUNCE_URLS")
            .ok()
            .map(|raw| endpoints_from_env(&raw))
            .filter(|eps| !eps.is_empty())
            .unwrap_or_else(default_endpoints);

        Self {
            endpoints,
            swarm: DEFAULT_SWARM.to_string(),
            request_timeout: Duration::from_secs(10),
            announce_interval: Duration::from_secs(30),
            numwant: 50,
        }
    }

    /// Replace the announce endpoint set.
    pub fn endpoints(mut self, endpoints: Vec<AnnounceEndpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Set the swarm key (default: `sat-mesh`).
    pub fn swarm(mut self, swarm: impl Into<String>) -> Self {
        self.swarm = swarm.into();
        self
    }

    /// Set the per-request timeout (default: 10 s).
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the minimum delay between announce cycles (default: 30 s).
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    /// Set how many peers to ask the tracker for (default: 50).
    pub fn numwant(mut self, numwant: u32) -> Self {
        self.numwant = numwant;
        self
    }

    pub fn endpoint_list(&self) -> &[AnnounceEndpoint] {
        &self.endpoints
    }

    pub fn swarm_key(&self) -> &str {
        &self.swarm
    }

    pub fn wanted(&self) -> u32 {
        self.numwant
    }
}

fn default_endpoints() -> Vec<AnnounceEndpoint> {
    // Constant list, all entries valid.
    parse_endpoints(DEFAULT_ANNOUNCE_URLS).unwrap_or_default()
}

fn endpoints_from_env(raw: &str) -> Vec<AnnounceEndpoint> {
    let mut out = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match AnnounceEndpoint::parse(part) {
            Ok(ep) if !out.contains(&ep) => out.push(ep),
            Ok(_) => {}
            Err(e) => tracing::warn!("SAT_ANNOUNCE_URLS: skipping {part}: {e}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = SignalingConfig::default()
            .endpoints(default_endpoints());
        assert_eq!(config.endpoint_list().len(), DEFAULT_ANNOUNCE_URLS.len());
        assert_eq!(config.swarm_key(), DEFAULT_SWARM);
        assert!(config.request_timeout >= Duration::from_secs(1));
        assert!(config.wanted() > 0);
    }

    #[test]
    fn env_list_skips_invalid_and_duplicates() {
        let eps = endpoints_from_env("wss://a.example.org, http://bad ,wss://a.example.org,,ws://b.example.org");
        let hosts: Vec<_> = eps.iter().map(|e| e.url().host_str().unwrap()).collect();
        assert_eq!(hosts, vec!["a.example.org", "b.example.org"]);
    }
}
