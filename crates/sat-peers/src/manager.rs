use std::sync::Arc;
use std::time::Duration;

use sat_metrics::Counter;
use sat_signal::{
    parse_endpoints, AnnounceEndpoint, PeerId, SignalingClient, SignalingTransport, WsTracker,
};
use tokio::runtime::Handle;
use tracing::info;

use crate::config::ManagerConfig;
use crate::error::PeerError;
use crate::events::{HandlerError, PeerEvent, SubscriptionId, Topic};
use crate::lifecycle::{lock, read, ManagerCore};
use crate::session::{SessionFactory, SignalOnlyFactory};
use crate::stats::ManagerStats;
use crate::types::{PeerSnapshot, PeerState, Stage};

/// Handle to a peer connection manager. Cheap to clone.
///
/// Must be created inside a tokio runtime: handshakes and the announce
/// loop are spawned on it.
///
/// ```rust,no_run
/// use sat_peers::{ManagerConfig, PeerEvent, PeerManager};
/// use sat_signal::PeerId;
///
/// # async fn example() -> Result<(), sat_peers::PeerError> {
/// let manager = PeerManager::with_trackers(ManagerConfig::new())?;
/// manager.subscribe_all(|event: &PeerEvent| {
///     println!("{event:?}");
///     Ok(())
/// });
///
/// // Queued until init.
/// manager.connect(PeerId::new("peer-b").unwrap());
/// manager.init("local-1")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PeerManager {
    core: Arc<ManagerCore>,
}

impl PeerManager {
    /// Manager over an arbitrary signaling transport, with signal-only sessions.
    pub fn new(
        config: ManagerConfig,
        transport: Arc<dyn SignalingTransport>,
    ) -> Result<Self, PeerError> {
        Self::with_session_factory(config, transport, Arc::new(SignalOnlyFactory::default()))
    }

    /// Manager speaking to WebSocket trackers.
    pub fn with_trackers(config: ManagerConfig) -> Result<Self, PeerError> {
        let signaling = config.signaling_config();
        let transport = Arc::new(WsTracker::new(signaling.swarm_key(), signaling.wanted()));
        Self::new(config, transport)
    }

    pub fn with_session_factory(
        config: ManagerConfig,
        transport: Arc<dyn SignalingTransport>,
        factory: Arc<dyn SessionFactory>,
    ) -> Result<Self, PeerError> {
        let runtime = Handle::try_current().map_err(|_| PeerError::NoRuntime)?;
        let signaling = SignalingClient::new(config.signaling.clone(), transport);
        let log_events = config.log_events;
        let core = Arc::new(ManagerCore::new(config, runtime, signaling, factory));

        if log_events {
            core.emitter.subscribe_all(|event| {
                info!(?event, "peer event");
                Ok(())
            });
        }
        Ok(Self { core })
    }

    // ── Commands ────────────────────────────────────────────────────────

    /// Set the local identity, publish `Initialized`, replay queued
    /// connects in issue order and start announcing.
    pub fn init(&self, identity: impl AsRef<str>) -> Result<(), PeerError> {
        self.core.init(identity.as_ref())
    }

    /// Connect to `peer_id`. Queued before `init`; a no-op while a
    /// handshake or session for the peer exists. Outcomes arrive as events.
    pub fn connect(&self, peer_id: PeerId) {
        self.core.connect(peer_id);
    }

    /// Tear down a peer. Idempotent for closed peers.
    pub fn close(&self, peer_id: &PeerId) -> Result<(), PeerError> {
        self.core.close(peer_id)
    }

    /// Stop announcing, abort handshakes and close every session.
    pub fn shutdown(&self) {
        self.core.shutdown();
    }

    /// Replace the announce endpoints. Applies to announce cycles and offer
    /// exchanges that start afterwards.
    pub fn set_announce_urls<I, S>(&self, urls: I) -> Result<(), PeerError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = parse_endpoints(urls)?;
        self.core.signaling.set_endpoints(endpoints);
        Ok(())
    }

    // ── Events ──────────────────────────────────────────────────────────

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&PeerEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.core.emitter.subscribe(topic, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PeerEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.core.emitter.subscribe_all(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core.emitter.unsubscribe(id)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn exists(&self, peer_id: &PeerId) -> bool {
        read(&self.core.registry).has(peer_id)
    }

    pub fn get_peer(&self, peer_id: &PeerId) -> Option<PeerSnapshot> {
        read(&self.core.registry).get(peer_id)
    }

    pub fn peer_count(&self) -> usize {
        read(&self.core.registry).len()
    }

    pub fn peers(&self) -> Vec<PeerSnapshot> {
        read(&self.core.registry).peers()
    }

    pub fn count_in(&self, state: PeerState) -> usize {
        read(&self.core.registry).count_in(state)
    }

    pub fn stale_peers(&self, max_idle: Duration) -> Vec<PeerId> {
        read(&self.core.registry).stale_peers(max_idle)
    }

    pub fn identity(&self) -> Option<PeerId> {
        self.core.identity.get().cloned()
    }

    pub fn stage(&self) -> Stage {
        *read(&self.core.stage)
    }

    pub fn announce_urls(&self) -> Vec<AnnounceEndpoint> {
        self.core.signaling.endpoints().as_ref().clone()
    }

    /// Peers remembered from the latest announce round.
    pub fn discovered_count(&self) -> usize {
        lock(&self.core.seen).len()
    }

        /// Connects waiting for `init`.
    pub fn pending_count(&self) -> usize {
        lock(&self.core.queue).len()
    }

    /// Open transport sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.core.sessions).len()
    }

    pub fn stats(&self) -> ManagerStats {
        let mut stats = self.core.stats.clone();
        stats.handler_failures = Counter::with_value(self.core.emitter.failures());
        stats
    }
}
