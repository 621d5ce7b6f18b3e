use sat_signal::{PeerId, SignalingError};
use serde::{Deserialize, Serialize};

use crate::types::PeerState;

/// Errors returned by [`PeerManager`](crate::PeerManager) operations.
///
/// Network failures never show up here: they are absorbed by the retry
/// policy and surface as [`PeerEvent::PeerFailed`](crate::PeerEvent).
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("invalid transition for {peer_id}: {from} -> {to}")]
    InvalidTransition {
        peer_id: PeerId,
        from: PeerState,
        to: PeerState,
    },

    #[error("unknown peer: {peer_id}")]
    UnknownPeer { peer_id: PeerId },

    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),

    #[error("manager already initialized")]
    AlreadyInitialized,

    #[error("manager has been shut down")]
    ManagerShutdown,

    #[error("peer manager requires a tokio runtime")]
    NoRuntime,

    #[error("invalid announce endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("signaling error: {0}")]
    Signaling(#[source] SignalingError),
}

impl From<SignalingError> for PeerError {
    fn from(e: SignalingError) -> Self {
        match e {
            SignalingError::InvalidEndpoint(url) => PeerError::InvalidEndpoint(url),
            SignalingError::InvalidPeerId(id) => PeerError::InvalidIdentity(id),
            other => PeerError::Signaling(other),
        }
    }
}

/// Why a peer ended up in [`PeerState::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Retries exhausted on transient signaling errors.
    #[error("signaling timed out after {attempts} attempts")]
    SignalingTimeout { attempts: u32 },

    #[error("signaling rejected: {reason}")]
    SignalingRejected { reason: String },

    /// The local session refused the remote answer.
    #[error("negotiation failed: {reason}")]
    NegotiationFailed { reason: String },

    #[error("manager shut down")]
    ManagerShutdown,

    /// Closed by the application while the handshake was in flight.
    #[error("handshake cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_invalid_transition() {
        let err = PeerError::InvalidTransition {
            peer_id: PeerId::new("peer-a").unwrap(),
            from: PeerState::Closed,
            to: PeerState::Connecting,
        };
        assert_eq!(
            err.to_string(),
            "invalid transition for peer-a: closed -> connecting"
        );
    }

    #[test]
    fn test_signaling_conversion() {
        let err: PeerError = SignalingError::InvalidEndpoint("http://x".into()).into();
        assert!(matches!(err, PeerError::InvalidEndpoint(url) if url == "http://x"));

        let err: PeerError = SignalingError::Timeout.into();
        assert!(matches!(err, PeerError::Signaling(SignalingError::Timeout)));
    }

    #[test]
    fn test_failure_reason_json() {
        let json = serde_json::to_string(&FailureReason::SignalingTimeout { attempts: 4 }).unwrap();
        assert_eq!(json, r#"{"kind":"signaling_timeout","attempts":4}"#);
        let json = serde_json::to_string(&FailureReason::Cancelled).unwrap();
        assert_eq!(json, r#"{"kind":"cancelled"}"#);
    }
}
