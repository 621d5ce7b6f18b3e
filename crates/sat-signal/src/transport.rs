use std::time::Duration;

use crate::endpoint::AnnounceEndpoint;
use crate::wire::SessionDescription;
use crate::{PeerId, SignalingError};

/// What one endpoint answered to a discovery announce.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceReply {
    pub peers: Vec<PeerId>,
    /// Re-announce interval requested by the tracker.
    pub interval: Option<Duration>,
}

/// Network abstraction for the signaling client.
///
/// In production: [`WsTracker`](crate::WsTracker) (WebSocket trackers).
/// In tests: [`mock::MockTransport`] (scripted, records calls).
///
/// Implementations talk to exactly one endpoint per call; failover and
/// timeouts are the client's job.
#[async_trait::async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Announce `identity` on `endpoint` and collect the peers it knows.
    async fn announce(
        &self,
        endpoint: &AnnounceEndpoint,
        identity: &PeerId,
    ) -> Result<AnnounceReply, SignalingError>;

    /// Relay `offer` to `peer` through `endpoint` and wait for its answer.
    async fn exchange_offer(
        &self,
        endpoint: &AnnounceEndpoint,
        identity: &PeerId,
        peer: &PeerId,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError>;
}

// ── MockTransport (tests) ───────────────────────────────────────────

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Scripted result of one announce call on one endpoint.
    #[derive(Debug, Clone)]
    pub enum AnnounceScript {
        Reply(AnnounceReply),
        Unreachable,
        /// Never resolves; only the client's timeout ends it.
        Hang,
    }

    /// Scripted result of one offer exchange.
    #[derive(Debug, Clone)]
    pub enum OfferScript {
        Answer,
        /// Answer after a delay (keeps the handshake in flight).
        AnswerAfter(Duration),
        Timeout,
        Reject(String),
        Unreachable,
        Hang,
    }

    #[derive(Default)]
    struct State {
        announce: HashMap<String, AnnounceScript>,
        offers: HashMap<PeerId, VecDeque<OfferScript>>,
        announce_calls: Vec<String>,
        offer_calls: Vec<(String, PeerId)>,
    }

    /// Fake transport: per-endpoint announce scripts, per-peer offer scripts.
    ///
    /// Unscripted endpoints reply with no peers; unscripted offers are
    /// answered immediately.
    #[derive(Clone, Default)]
    pub struct MockTransport {
        state: Arc<Mutex<State>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script_announce(&self, endpoint: &AnnounceEndpoint, script: AnnounceScript) {
            self.state
                .lock()
                .unwrap()
                .announce
                .insert(endpoint.to_string(), script);
        }

        /// Queue outcomes for the next offer exchanges with `peer`.
        /// The last outcome repeats once the queue is down to one entry.
        pub fn script_offers(&self, peer: &PeerId, scripts: Vec<OfferScript>) {
            self.state
                .lock()
                .unwrap()
                .offers
                .insert(peer.clone(), scripts.into());
        }

        pub fn announce_calls(&self) -> Vec<String> {
            self.state.lock().unwrap().announce_calls.clone()
        }

        pub fn offer_calls(&self) -> Vec<(String, PeerId)> {
            self.state.lock().unwrap().offer_calls.clone()
        }

        pub fn offer_attempts(&self, peer: &PeerId) -> usize {
            self.state
                .lock()
                .unwrap()
                .offer_calls
                .iter()
                .filter(|(_, p)| p == peer)
                .count()
        }

        fn next_offer(&self, endpoint: &AnnounceEndpoint, peer: &PeerId) -> OfferScript {
            let mut state = self.state.lock().unwrap();
            state.offer_calls.push((endpoint.to_string(), peer.clone()));
            match state.offers.get_mut(peer) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(OfferScript::Answer),
                Some(queue) => queue.front().cloned().unwrap_or(OfferScript::Answer),
                None => OfferScript::Answer,
            }
        }
    }

    fn unreachable(endpoint: &AnnounceEndpoint) -> SignalingError {
        SignalingError::Connect {
            endpoint: endpoint.to_string(),
            source: anyhow::anyhow!("mock: endpoint unreachable"),
        }
    }

    #[async_trait::async_trait]
    impl SignalingTransport for MockTransport {
        async fn announce(
            &self,
            endpoint: &AnnounceEndpoint,
            _identity: &PeerId,
        ) -> Result<AnnounceReply, SignalingError> {
            let script = {
                let mut state = self.state.lock().unwrap();
                state.announce_calls.push(endpoint.to_string());
                state.announce.get(endpoint.as_str()).cloned()
            };
            match script {
                None => Ok(AnnounceReply::default()),
                Some(AnnounceScript::Reply(reply)) => Ok(reply),
                Some(AnnounceScript::Unreachable) => Err(unreachable(endpoint)),
                Some(AnnounceScript::Hang) => std::future::pending().await,
            }
        }

        async fn exchange_offer(
            &self,
            endpoint: &AnnounceEndpoint,
            _identity: &PeerId,
            peer: &PeerId,
            offer: SessionDescription,
        ) -> Result<SessionDescription, SignalingError> {
            let answer = SessionDescription::answer(format!("answer-to:{}", offer.sdp));
            match self.next_offer(endpoint, peer) {
                OfferScript::Answer => Ok(answer),
                OfferScript::AnswerAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(answer)
                }
                OfferScript::Timeout => Err(SignalingError::Timeout),
                OfferScript::Reject(reason) => Err(SignalingError::Rejected { reason }),
                OfferScript::Unreachable => Err(unreachable(endpoint)),
                OfferScript::Hang => std::future::pending().await,
            }
        }
    }
}
