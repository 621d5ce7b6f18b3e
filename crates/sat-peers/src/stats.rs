use sat_metrics::{Counter, Gauge};
use serde::{Deserialize, Serialize};

/// Manager counters. [`PeerManager::stats`](crate::PeerManager::stats)
/// returns a detached copy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManagerStats {
    /// `connect` calls, queued or live.
    pub connect_requests: Counter,
    /// Connects ignored because a handshake or session already existed.
    pub dedup_hits: Counter,
    pub signaling_attempts: Counter,
    pub retries: Counter,
    pub connected: Counter,
    pub failed: Counter,
    pub closed: Counter,
    pub handler_failures: Counter,
    /// Announce cycles in which no endpoint answered.
    pub degraded_cycles: Counter,
    /// Peers currently in `Connected`.
    pub connected_peers: Gauge,
}
