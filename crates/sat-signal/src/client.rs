//! SignalingClient: failover across announce endpoints.
//!
//! Holds the endpoint set as an `Arc` snapshot: every announce cycle and
//! every offer exchange reads the snapshot once when it starts, so
//! replacing the set never disturbs work already in progress.
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignalingConfig;
use crate::endpoint::AnnounceEndpoint;
use crate::transport::SignalingTransport;
use crate::wire::SessionDescription;
use crate::{PeerId, SignalingError};

/// Buffer between the announce task and its consumer.
const ANNOUNCE_BUFFER: usize = 64;

/// Outcome of one announce cycle across all endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnounceRound {
    /// Discovered peers, first-seen order, deduplicated, self excluded.
    pub peers: Vec<PeerId>,
    /// Largest interval any tracker asked for.
    pub interval: Option<Duration>,
    pub reachable: usize,
    pub attempted: usize,
}

struct ClientInner {
    transport: Arc<dyn SignalingTransport>,
    endpoints: RwLock<Arc<Vec<AnnounceEndpoint>>>,
    config: SignalingConfig,
}

/// Client for a set of announce endpoints. Cheap to clone.
#[derive(Clone)]
pub struct SignalingClient {
    inner: Arc<ClientInner>,
}

impl SignalingClient {
    pub fn new(config: SignalingConfig, transport: Arc<dyn SignalingTransport>) -> Self {
        let endpoints = Arc::new(config.endpoints.clone());
        Self {
            inner: Arc::new(ClientInner {
                transport,
                endpoints: RwLock::new(endpoints),
                config,
            }),
        }
    }

    pub fn config(&self) -> &SignalingConfig {
        &self.inner.config
    }

    /// Current endpoint snapshot.
    pub fn endpoints(&self) -> Arc<Vec<AnnounceEndpoint>> {
        self.inner
            .endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the endpoint set. Takes effect for cycles and exchanges
    /// started after this call.
    pub fn set_endpoints(&self, endpoints: Vec<AnnounceEndpoint>) {
        info!("announce endpoints replaced ({} configured)", endpoints.len());
        *self
            .inner
            .endpoints
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(endpoints);
    }

    /// Delay before the next announce cycle: the configured minimum, or the
    /// tracker's interval when it asks for longer.
    pub fn cycle_delay(&self, tracker_interval: Option<Duration>) -> Duration {
        let min = self.inner.config.announce_interval;
        tracker_interval.map_or(min, |i| i.max(min))
    }

    /// Run a single announce cycle against every endpoint concurrently.
    ///
    /// Fails with `NoReachableEndpoints` only when no endpoint answered.
    pub async fn announce_once(&self, identity: &PeerId) -> Result<AnnounceRound, SignalingError> {
        let endpoints = self.endpoints();
        let timeout = self.inner.config.request_timeout;
        let transport = &self.inner.transport;

        let replies = join_all(endpoints.iter().map(|endpoint| async move {
            let outcome = tokio::time::timeout(timeout, transport.announce(endpoint, identity))
                .await
                .unwrap_or(Err(SignalingError::Timeout));
            (endpoint, outcome)
        }))
        .await;

        let mut round = AnnounceRound {
            attempted: endpoints.len(),
            ..AnnounceRound::default()
        };
        let mut seen = HashSet::new();
        for (endpoint, outcome) in replies {
            match outcome {
                Ok(reply) => {
                    round.reachable += 1;
                    round.interval = round.interval.max(reply.interval);
                    for peer in reply.peers {
                        if &peer != identity && seen.insert(peer.clone()) {
                            round.peers.push(peer);
                        }
                    }
                }
                Err(e) => warn!(endpoint = %endpoint, "announce failed: {e}"),
            }
        }

        if round.reachable == 0 {
            return Err(SignalingError::NoReachableEndpoints {
                attempted: round.attempted,
            });
        }
        debug!(
            "announce cycle: {} peers from {}/{} endpoints",
            round.peers.len(),
            round.reachable,
            round.attempted
        );
        Ok(round)
    }

    /// Announce continuously and stream discovered peers.
    ///
    /// Each cycle yields its peers, or one `Err(NoReachableEndpoints)` when
    /// every endpoint failed; cycling continues either way until the stream
    /// is cancelled or dropped.
    pub fn announce(&self, identity: PeerId) -> AnnounceStream {
        self.announce_with(identity, CancellationToken::new())
    }

    /// Pull-based announce cycles for callers that want whole rounds.
    /// Nothing runs until [`AnnounceCycles::next`] is awaited.
    pub fn announce_cycles(&self, identity: PeerId, cancel: CancellationToken) -> AnnounceCycles {
        AnnounceCycles {
            client: self.clone(),
            identity,
            cancel,
            wait: None,
            started: false,
        }
    }

    /// Like [`announce`](Self::announce), cancelled together with `parent`.
    pub fn announce_with(&self, identity: PeerId, parent: CancellationToken) -> AnnounceStream {
        let cancel = parent.child_token();
        let (tx, rx) = mpsc::channel(ANNOUNCE_BUFFER);
        tokio::spawn(announce_task(self.clone(), identity, tx, cancel.clone()));
        AnnounceStream { rx, cancel }
    }

    /// Relay an offer to `peer` and wait for its answer.
    ///
    /// Endpoints are tried in order. A rejection ends the exchange; any
    /// other failure moves on to the next endpoint. When all fail, the
    /// result is `Timeout` if any endpoint timed out, else
    /// `NoReachableEndpoints`.
    pub async fn exchange_offer(
        &self,
        identity: &PeerId,
        peer: &PeerId,
        offer: SessionDescription,
    ) -> Result<SessionDescription, SignalingError> {
        let endpoints = self.endpoints();
        let timeout = self.inner.config.request_timeout;
        let mut timed_out = false;

        for endpoint in endpoints.iter() {
            let exchange = self
                .inner
                .transport
                .exchange_offer(endpoint, identity, peer, offer.clone());
            match tokio::time::timeout(timeout, exchange).await {
                Ok(Ok(answer)) => {
                    debug!(endpoint = %endpoint, peer = %peer.short(), "answer received");
                    return Ok(answer);
                }
                Ok(Err(SignalingError::Rejected { reason })) => {
                    info!(endpoint = %endpoint, peer = %peer.short(), "offer rejected: {reason}");
                    return Err(SignalingError::Rejected { reason });
                }
                Ok(Err(SignalingError::Timeout)) | Err(_) => {
                    debug!(endpoint = %endpoint, peer = %peer.short(), "offer timed out");
                    timed_out = true;
                }
                Ok(Err(e)) => {
                    warn!(endpoint = %endpoint, peer = %peer.short(), "offer exchange failed: {e}");
                }
            }
        }

        if timed_out {
            Err(SignalingError::Timeout)
        } else {
            Err(SignalingError::NoReachableEndpoints {
                attempted: endpoints.len(),
            })
        }
    }
}

/// Announce cycle driver: one [`AnnounceRound`] per call to
/// [`next`](Self::next), with the inter-cycle wait in between.
///
/// The wait starts when the consumer asks for the next round, so a slow
/// consumer delays the following cycle rather than queueing rounds.
pub struct AnnounceCycles {
    client: SignalingClient,
    identity: PeerId,
    cancel: CancellationToken,
    wait: Option<Duration>,
    started: bool,
}

impl AnnounceCycles {
    /// Run the next cycle, or `None` once cancelled.
    pub async fn next(&mut self) -> Option<Result<AnnounceRound, SignalingError>> {
        if !self.started {
            self.started = true;
            info!(
                identity = %self.identity.short(),
                endpoints = self.client.endpoints().len(),
                "announce loop started"
            );
        }
        if let Some(wait) = self.wait.take() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return self.stopped(),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        let round = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.stopped(),
            round = self.client.announce_once(&self.identity) => round,
        };
        let tracker_interval = round.as_ref().ok().and_then(|r| r.interval);
        self.wait = Some(self.client.cycle_delay(tracker_interval));
        Some(round)
    }

    fn stopped<T>(&self) -> Option<T> {
        debug!(identity = %self.identity.short(), "announce loop stopped");
        None
    }
}

/// Lazy, unbounded stream of discovered peers. Cancelled on drop.
pub struct AnnounceStream {
    rx: mpsc::Receiver<Result<PeerId, SignalingError>>,
    cancel: CancellationToken,
}

impl AnnounceStream {
    /// Next discovered peer, or `None` once cancelled.
    pub async fn next(&mut self) -> Option<Result<PeerId, SignalingError>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for AnnounceStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn announce_task(
    client: SignalingClient,
    identity: PeerId,
    tx: mpsc::Sender<Result<PeerId, SignalingError>>,
    cancel: CancellationToken,
) {
    let mut cycles = client.announce_cycles(identity, cancel);
    while let Some(round) = cycles.next().await {
        match round {
            Ok(round) => {
                for peer in round.peers {
                    if tx.send(Ok(peer)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    return;
                }
            }
        }
    }
}
