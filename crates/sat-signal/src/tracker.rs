//! WebSocket tracker transport.
//!
//! One short-lived socket per request: connect, send a single frame, read
//! frames until the matching reply, close. Timeouts are applied by the
//! [`SignalingClient`](crate::SignalingClient), so a silent tracker simply
//! leaves the read pending.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::endpoint::AnnounceEndpoint;
use crate::transport::{AnnounceReply, SignalingTransport};
use crate::wire::{SessionDescription, TrackerMessage, TrackerRequest};
use crate::{PeerId, SignalingError};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`SignalingTransport`] speaking the WebTorrent tracker protocol.
#[derive(Debug, Clone)]
pub struct WsTracker {
    swarm: String,
    numwant: u32,
}

impl WsTracker {
    pub fn new(swarm: impl Into<String>, numwant: u32) -> Self {
        Self {
            swarm: swarm.into(),
            numwant,
        }
    }

    async fn open(&self, endpoint: &AnnounceEndpoint) -> Result<Socket, SignalingError> {
        let (socket, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| SignalingError::Connect {
                endpoint: endpoint.to_string(),
                source: e.into(),
            })?;
        Ok(socket)
    }

    /// Send one request and read frames until `accept` picks a reply.
    async fn request<T>(
        &self,
        endpoint: &AnnounceEndpoint,
        request: &TrackerRequest,
        mut accept: impl FnMut(TrackerMessage) -> Option<Result<T, SignalingError>>,
    ) -> Result<T, SignalingError> {
        let mut socket = self.open(endpoint).await?;
        socket
            .send(Message::Text(request.to_json()?))
            .await
            .map_err(|e| SignalingError::Connect {
                endpoint: endpoint.to_string(),
                source: e.into(),
            })?;

        let result = loop {
            let frame = match socket.next().await {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    break Err(SignalingError::Connect {
                        endpoint: endpoint.to_string(),
                        source: e.into(),
                    })
                }
                None => {
                    break Err(SignalingError::Protocol(format!(
                        "{endpoint} closed the socket before replying"
                    )))
                }
            };

            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => {
                    break Err(SignalingError::Protocol(format!(
                        "{endpoint} closed the socket before replying"
                    )))
                }
                _ => continue,
            };

            let msg = match TrackerMessage::from_json(&text) {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(endpoint = %endpoint, "ignoring malformed tracker frame: {e}");
                    continue;
                }
            };

            if let Some(warning) = &msg.warning_message {
                warn!(endpoint = %endpoint, "tracker warning: {warning}");
            }
            if let Some(reason) = msg.failure_reason.clone() {
                break Err(SignalingError::Rejected { reason });
            }
            if let Some(outcome) = accept(msg) {
                break outcome;
            }
        };

        if let Err(e) = socket.close(None).await {
            debug!(endpoint = %endpoint, "closing tracker socket: {e}");
        }
        result
    }
}

#[async_trait::async_trait]
impl SignalingTransport for WsTracker {
    async fn announce(
        &self,
        endpoint: &AnnounceEndpoint,
        identity: &PeerId,
    ) -> Result<AnnounceReply, SignalingError> {
        let request = TrackerRequest::announce(&self.swarm, identity, self.numwant);
        self.request(endpoint, &request, |msg| {
            msg.is_announce_reply().then(|| {
                Ok(AnnounceReply {
                    peers: msg.peer_ids(),
                    interval: msg.interval.map(Duration::from_secs),
                })
            })
        })
        .await
    }

    async fn exchange_offer(
        &self,
        endpoint: &AnnounceEndpoint,
        identity: &PeerId,
        peer: &PeerId,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let offer_id = uuid::Uuid::new_v4().simple().to_string();
        let request = TrackerRequest::offer(&self.swarm, identity, peer, offer_id.clone(), offer);
        self.request(endpoint, &request, |msg| {
            msg.answer_for(&offer_id).cloned().map(Ok)
        })
        .await
    }
}
