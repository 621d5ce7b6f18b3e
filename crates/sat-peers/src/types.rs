use std::fmt;

use sat_signal::PeerId;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::FailureReason;

/// Connection state of one remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    Discovered,
    Connecting,
    Connected,
    Failed,
    Closed,
}

impl PeerState {
    pub const ALL: [PeerState; 5] = [
        PeerState::Discovered,
        PeerState::Connecting,
        PeerState::Connected,
        PeerState::Failed,
        PeerState::Closed,
    ];

    /// The only edges a record may take. Everything else is rejected.
    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;
        matches!(
            (self, next),
            (Discovered, Connecting)
                | (Connecting, Connected)
                | (Connecting, Failed)
                | (Connected, Closed)
                | (Failed, Closed)
        )
    }

    /// A handshake is running or a session is up. A new `connect` is a no-op.
    pub fn is_active(self) -> bool {
        matches!(self, PeerState::Connecting | PeerState::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Failed | PeerState::Closed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Discovered => "discovered",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// How a peer entered the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerOrigin {
    /// Explicit `connect` from the application.
    Requested,
    /// Found by an announce cycle and auto-connected.
    Announced,
}

/// Index into the session table. Owned by exactly one peer record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Manager lifecycle stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// No identity yet; connects are queued.
    Uninitialized,
    Running,
    /// Terminal. Connects are ignored, `init` fails.
    ShutDown,
}

/// Read-only copy of a peer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub peer_id: PeerId,
    pub state: PeerState,
    pub origin: PeerOrigin,
    /// Signaling attempts made by the current connection cycle.
    pub attempts: u32,
    pub failure: Option<FailureReason>,
    pub session: Option<SessionId>,
    pub last_activity: Instant,
}
