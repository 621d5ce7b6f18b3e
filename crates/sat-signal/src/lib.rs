//! Tracker-style signaling for sat peer connections.
//!
//! Discovers peers and exchanges session offers/answers through one or
//! more WebTorrent-style announce endpoints, behind a stable API.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sat_signal::{PeerId, SignalingClient, SignalingConfig, WsTracker};
//!
//! # async fn example() -> Result<(), sat_signal::SignalingError> {
//! let config = SignalingConfig::new();
//! let transport = Arc::new(WsTracker::new(config.swarm_key(), config.wanted()));
//! let client = SignalingClient::new(config, transport);
//!
//! let me = PeerId::new("local-1")?;
//! let mut discovered = client.announce(me);
//! while let Some(peer) = discovered.next().await {
//!     match peer {
//!         Ok(peer) => println!("found {peer}"),
//!         Err(e) => eprintln!("announce cycle failed: {e}"),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod endpoint;
mod error;
mod tracker;
mod transport;
mod wire;

pub use client::{AnnounceCycles, AnnounceRound, AnnounceStream, SignalingClient};
pub use config::SignalingConfig;
pub use endpoint::{parse_endpoints, AnnounceEndpoint};
pub use error::SignalingError;
pub use tracker::WsTracker;
pub use transport::{AnnounceReply, SignalingTransport};
pub use wire::{SdpKind, SessionDescription, TrackerMessage, TrackerRequest};

#[cfg(any(test, feature = "test-util"))]
pub use transport::mock;

use std::fmt;
use std::str::FromStr;

/// Maximum length of a peer identifier in bytes.
pub const MAX_PEER_ID_LEN: usize = 64;

/// Identity of a participant on the signaling network.
///
/// Used both for remote peers and for the local identity a manager
/// announces with. Non-empty, at most [`MAX_PEER_ID_LEN`] bytes, no
/// whitespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    /// Validate and wrap a peer identifier.
    pub fn new(id: impl Into<String>) -> Result<Self, SignalingError> {
        let id = id.into();
        if id.is_empty()
            || id.len() > MAX_PEER_ID_LEN
            || id.chars().any(char::is_whitespace)
        {
            return Err(SignalingError::InvalidPeerId(id));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

impl FromStr for PeerId {
    type Err = SignalingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for PeerId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for PeerId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_rejects_empty_and_whitespace() {
        assert!(PeerId::new("").is_err());
        assert!(PeerId::new("peer a").is_err());
        assert!(PeerId::new("x".repeat(MAX_PEER_ID_LEN + 1)).is_err());
        assert!(PeerId::new("x".repeat(MAX_PEER_ID_LEN)).is_ok());
    }

    #[test]
    fn peer_id_short_is_char_safe() {
        let id = PeerId::new("ééééééééééé").unwrap();
        assert_eq!(id.short(), "éééééééé");
        let id = PeerId::new("abc").unwrap();
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn peer_id_serde_validates() {
        let id: PeerId = serde_json::from_str("\"peer-a\"").unwrap();
        assert_eq!(id.as_str(), "peer-a");
        assert!(serde_json::from_str::<PeerId>("\"\"").is_err());
    }
}
