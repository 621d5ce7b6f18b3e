/// Errors returned by the signaling layer.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    /// No answer arrived within the request timeout. Transient.
    #[error("signaling timed out")]
    Timeout,

    /// The tracker or the remote peer refused the exchange. Terminal.
    #[error("signaling rejected: {reason}")]
    Rejected { reason: String },

    /// Every configured announce endpoint failed.
    #[error("no reachable announce endpoints ({attempted} attempted)")]
    NoReachableEndpoints { attempted: usize },

    #[error("invalid announce endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("tracker protocol error: {0}")]
    Protocol(String),

    #[error("message serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("message deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),
}

impl SignalingError {
    /// Whether retrying the same request later may succeed.
    ///
    /// Rejections and malformed configuration never become valid by waiting.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            SignalingError::Rejected { .. }
                | SignalingError::InvalidEndpoint(_)
                | SignalingError::InvalidPeerId(_)
        )
    }
}
