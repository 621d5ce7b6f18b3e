//! Connection lifecycle controller.
//!
//! Owns every registry mutation. Each operation commits under the registry
//! write lock, queues its events in the outbox while still holding it, then
//! publishes with no lock held. Signaling I/O runs in one task per
//! handshake; the lock is never held across an `.await`.
//!
//! Lock order: stage → queue → registry → seen → sessions → inflight.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use sat_signal::{AnnounceRound, PeerId, SignalingClient, SignalingError};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::error::{FailureReason, PeerError};
use crate::events::{EventEmitter, Outbox, PeerEvent};
use crate::queue::{PendingCommand, PendingQueue};
use crate::registry::PeerRegistry;
use crate::session::{SessionFactory, SessionTable, TransportSession};
use crate::stats::ManagerStats;
use crate::types::{PeerOrigin, PeerState, SessionId, Stage};

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A handshake ready to be spawned.
struct Started {
    session_id: SessionId,
    session: Arc<dyn TransportSession>,
    cancel: CancellationToken,
}

pub(crate) struct ManagerCore {
    pub(crate) config: ManagerConfig,
    pub(crate) runtime: Handle,
    pub(crate) stage: RwLock<Stage>,
    pub(crate) identity: OnceLock<PeerId>,
    pub(crate) queue: Mutex<PendingQueue>,
    pub(crate) registry: RwLock<PeerRegistry>,
    /// Peers reported by the latest announce round. A peer that drops out
    /// of a round is forgotten and reported again if it comes back.
    pub(crate) seen: Mutex<HashSet<PeerId>>,
    pub(crate) sessions: Mutex<SessionTable>,
    pub(crate) inflight: Mutex<HashMap<PeerId, CancellationToken>>,
    pub(crate) emitter: EventEmitter,
    pub(crate) outbox: Outbox,
    pub(crate) signaling: SignalingClient,
    pub(crate) factory: Arc<dyn SessionFactory>,
    /// Root of every background task's cancellation.
    pub(crate) shutdown_token: CancellationToken,
    pub(crate) stats: ManagerStats,
    pub(crate) degraded: AtomicBool,
}

impl ManagerCore {
    pub(crate) fn new(
        config: ManagerConfig,
        runtime: Handle,
        signaling: SignalingClient,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        Self {
            config,
            runtime,
            stage: RwLock::new(Stage::Uninitialized),
            identity: OnceLock::new(),
            queue: Mutex::new(PendingQueue::new()),
            registry: RwLock::new(PeerRegistry::new()),
            seen: Mutex::new(HashSet::new()),
            sessions: Mutex::new(SessionTable::default()),
            inflight: Mutex::new(HashMap::new()),
            emitter: EventEmitter::new(),
            outbox: Outbox::default(),
            signaling,
            factory,
            shutdown_token: CancellationToken::new(),
            stats: ManagerStats::default(),
            degraded: AtomicBool::new(false),
        }
    }

    fn publish(&self) {
        self.outbox.flush(&self.emitter);
    }

    // ── Commands ────────────────────────────────────────────────────────

    pub(crate) fn init(self: &Arc<Self>, raw_identity: &str) -> Result<(), PeerError> {
        let identity = PeerId::new(raw_identity)
            .map_err(|_| PeerError::InvalidIdentity(raw_identity.to_string()))?;
        {
            let mut stage = write(&self.stage);
            match *stage {
                Stage::Running => return Err(PeerError::AlreadyInitialized),
                Stage::ShutDown => return Err(PeerError::ManagerShutdown),
                Stage::Uninitialized => {}
            }
            if self.identity.set(identity.clone()).is_err() {
                return Err(PeerError::AlreadyInitialized);
            }
            *stage = Stage::Running;
            self.outbox.push(PeerEvent::Initialized {
                identity: identity.clone(),
            });
        }
        info!(identity = %identity, "peer manager initialized");
        self.publish();

        let pending = lock(&self.queue).drain();
        if !pending.is_empty() {
            info!("replaying {} queued connect(s)", pending.len());
        }
        for command in pending {
            self.dispatch(command);
        }

        let cancel = self.shutdown_token.child_token();
        self.runtime
            .spawn(announce_loop(Arc::clone(self), identity, cancel));
        Ok(())
    }

    pub(crate) fn connect(self: &Arc<Self>, peer_id: PeerId) {
        self.stats.connect_requests.inc();
        let queued = peer_id.clone();
        let command = match lock(&self.queue).enqueue(PendingCommand::Connect { peer_id }) {
            Ok(()) => {
                debug!(peer = %queued.short(), "manager not initialized, connect queued");
                return;
            }
            Err(command) => command,
        };
        self.dispatch(command);
    }

    fn dispatch(self: &Arc<Self>, command: PendingCommand) {
        match command {
            PendingCommand::Connect { peer_id } => self.begin(peer_id, PeerOrigin::Requested),
        }
    }

    /// Dedup, open a session, move to `Connecting` and spawn the handshake.
    fn begin(self: &Arc<Self>, peer_id: PeerId, origin: PeerOrigin) {
        let stage = read(&self.stage);
        if *stage != Stage::Running {
            warn!(peer = %peer_id.short(), stage = ?*stage, "connect ignored");
            return;
        }
        let Some(identity) = self.identity.get().cloned() else {
            return;
        };

        let started = {
            let mut registry = write(&self.registry);
            match registry.state(&peer_id) {
                Some(state) if state.is_active() => {
                    self.stats.dedup_hits.inc();
                    debug!(peer = %peer_id.short(), %state, "connect deduplicated");
                    None
                }
                Some(state) => {
                    self.retire_locked(&mut registry, &peer_id, state);
                    self.open_locked(&mut registry, &peer_id, origin)
                }
                None => self.open_locked(&mut registry, &peer_id, origin),
            }
        };
        drop(stage);
        self.publish();

        if let Some(started) = started {
            self.runtime.spawn(run_handshake(
                Arc::clone(self),
                identity,
                peer_id,
                started,
            ));
        }
    }

    pub(crate) fn close(&self, peer_id: &PeerId) -> Result<(), PeerError> {
        let result = {
            let mut registry = write(&self.registry);
            match registry.state(peer_id) {
                None => Err(PeerError::UnknownPeer {
                    peer_id: peer_id.clone(),
                }),
                Some(PeerState::Closed) => {
                    debug!(peer = %peer_id.short(), "already closed");
                    Ok(())
                }
                Some(PeerState::Connecting) => {
                    self.abort_locked(&mut registry, peer_id, FailureReason::Cancelled);
                    Ok(())
                }
                Some(_) => self.close_locked(&mut registry, peer_id),
            }
        };
        self.publish();
        result
    }

    pub(crate) fn shutdown(&self) {
        {
            let mut stage = write(&self.stage);
            if *stage == Stage::ShutDown {
                return;
            }
            *stage = Stage::ShutDown;
            self.shutdown_token.cancel();

            let dropped = lock(&self.queue).drain();
            if !dropped.is_empty() {
                warn!("shutdown dropped {} queued connect(s)", dropped.len());
            }

            let mut registry = write(&self.registry);
            for peer in registry.peers() {
                match peer.state {
                    PeerState::Connecting => {
                        self.abort_locked(&mut registry, &peer.peer_id, FailureReason::ManagerShutdown)
                    }
                    PeerState::Connected | PeerState::Failed => {
                        if let Err(e) = self.close_locked(&mut registry, &peer.peer_id) {
                            warn!(peer = %peer.peer_id.short(), "close during shutdown failed: {e}");
                        }
                    }
                    PeerState::Discovered | PeerState::Closed => {}
                }
            }
            lock(&self.seen).clear();
            lock(&self.inflight).clear();
        }
        info!("peer manager shut down");
        self.publish();
    }

    // ── Registry commits (registry write lock held) ─────────────────────

    /// Clear a terminal record so a new connection cycle can start.
    fn retire_locked(&self, registry: &mut PeerRegistry, peer_id: &PeerId, state: PeerState) {
        if state == PeerState::Failed {
            if let Err(e) = self.close_locked(registry, peer_id) {
                warn!(peer = %peer_id.short(), "retiring failed record: {e}");
            }
        }
        registry.remove(peer_id);
        debug!(peer = %peer_id.short(), from = %state, "record retired for reconnect");
    }

    fn open_locked(
        &self,
        registry: &mut PeerRegistry,
        peer_id: &PeerId,
        origin: PeerOrigin,
    ) -> Option<Started> {
        registry.insert(peer_id.clone(), origin);
        let session = self.factory.open(peer_id);
        let session_id = lock(&self.sessions).insert(Arc::clone(&session));

        if let Err(e) = registry.start_connecting(peer_id, session_id) {
            warn!(peer = %peer_id.short(), "cannot start connecting: {e}");
            lock(&self.sessions).release(session_id);
            registry.remove(peer_id);
            return None;
        }

        let cancel = self.shutdown_token.child_token();
        lock(&self.inflight).insert(peer_id.clone(), cancel.clone());
        info!(peer = %peer_id.short(), ?origin, %session_id, "connecting");
        self.outbox.push(PeerEvent::PeerConnecting {
            peer_id: peer_id.clone(),
            origin,
        });
        Some(Started {
            session_id,
            session,
            cancel,
        })
    }

    fn fail_locked(&self, registry: &mut PeerRegistry, peer_id: &PeerId, reason: FailureReason) {
        match registry.fail(peer_id, reason.clone()) {
            Ok(change) => {
                if let Some(session_id) = change.released {
                    lock(&self.sessions).release(session_id);
                }
                self.stats.failed.inc();
                warn!(peer = %peer_id.short(), "connection failed: {reason}");
                self.outbox.push(PeerEvent::PeerFailed {
                    peer_id: peer_id.clone(),
                    reason,
                });
            }
            Err(e) => warn!(peer = %peer_id.short(), "cannot mark failed: {e}"),
        }
    }

    fn close_locked(&self, registry: &mut PeerRegistry, peer_id: &PeerId) -> Result<(), PeerError> {
        let change = registry.transition(peer_id, PeerState::Closed)?;
        if let Some(session_id) = change.released {
            lock(&self.sessions).release(session_id);
        }
        if change.from == PeerState::Connected {
            self.stats.connected_peers.dec();
        }
        self.stats.closed.inc();
        info!(peer = %peer_id.short(), from = %change.from, "closed");
        self.outbox.push(PeerEvent::PeerClosed {
            peer_id: peer_id.clone(),
        });
        Ok(())
    }

    /// Cancel an in-flight handshake: `Connecting → Failed → Closed`.
    fn abort_locked(&self, registry: &mut PeerRegistry, peer_id: &PeerId, reason: FailureReason) {
        if let Some(token) = lock(&self.inflight).remove(peer_id) {
            token.cancel();
        }
        self.fail_locked(registry, peer_id, reason);
        if let Err(e) = self.close_locked(registry, peer_id) {
            warn!(peer = %peer_id.short(), "cannot close aborted peer: {e}");
        }
    }

    /// Commit a handshake outcome if the record still belongs to it.
    fn finish_handshake(
        &self,
        peer_id: &PeerId,
        session_id: SessionId,
        outcome: Result<(), FailureReason>,
    ) {
        {
            let mut registry = write(&self.registry);
            let current = registry.state(peer_id) == Some(PeerState::Connecting)
                && registry.session_of(peer_id) == Some(session_id);
            if !current {
                debug!(peer = %peer_id.short(), %session_id, "handshake outcome discarded");
                return;
            }
            lock(&self.inflight).remove(peer_id);

            match outcome {
                Ok(()) => match registry.transition(peer_id, PeerState::Connected) {
                    Ok(_) => {
                        registry.touch(peer_id);
                        self.stats.connected.inc();
                        self.stats.connected_peers.inc();
                        info!(peer = %peer_id.short(), "connected");
                        self.outbox.push(PeerEvent::PeerConnected {
                            peer_id: peer_id.clone(),
                        });
                    }
                    Err(e) => warn!(peer = %peer_id.short(), "cannot mark connected: {e}"),
                },
                Err(reason) => self.fail_locked(&mut registry, peer_id, reason),
            }
        }
        self.publish();
    }

    fn cancel_reason(&self) -> FailureReason {
        if self.shutdown_token.is_cancelled() {
            FailureReason::ManagerShutdown
        } else {
            FailureReason::Cancelled
        }
    }

    // ── Announce results ────────────────────────────────────────────────

    fn on_round(self: &Arc<Self>, round: AnnounceRound) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            info!(reachable = round.reachable, "announce endpoints reachable again");
            self.outbox.push(PeerEvent::Recovered {
                reachable: round.reachable,
            });
        }

        let mut fresh = Vec::new();
        {
            let registry = read(&self.registry);
            let mut seen = lock(&self.seen);
            let current: HashSet<&PeerId> = round.peers.iter().collect();
            seen.retain(|peer_id| current.contains(peer_id));
            for peer_id in &round.peers {
                if registry.has(peer_id) || !seen.insert(peer_id.clone()) {
                    continue;
                }
                debug!(peer = %peer_id.short(), "discovered");
                self.outbox.push(PeerEvent::PeerDiscovered {
                    peer_id: peer_id.clone(),
                });
                fresh.push(peer_id.clone());
            }
        }
        self.publish();

        if self.config.auto_connect {
            for peer_id in fresh {
                self.begin(peer_id, PeerOrigin::Announced);
            }
        }
    }

    fn on_round_failed(&self, error: SignalingError) {
        match error {
            SignalingError::NoReachableEndpoints { attempted } => {
                self.stats.degraded_cycles.inc();
                if self.degraded.swap(true, Ordering::AcqRel) {
                    debug!(attempted, "announce endpoints still unreachable");
                    return;
                }
                warn!(attempted, "all announce endpoints unreachable, running degraded");
                self.outbox.push(PeerEvent::Degraded { attempted });
                self.publish();
            }
            other => warn!("announce cycle failed: {other}"),
        }
    }
}

// ── Background tasks ────────────────────────────────────────────────────

async fn run_handshake(core: Arc<ManagerCore>, identity: PeerId, peer_id: PeerId, started: Started) {
    let Started {
        session_id,
        session,
        cancel,
    } = started;

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(core.cancel_reason()),
        result = negotiate(&core, &identity, &peer_id, session.as_ref()) => result,
    };
    core.finish_handshake(&peer_id, session_id, outcome);
}

/// Offer/answer exchange with retry on transient signaling errors.
async fn negotiate(
    core: &ManagerCore,
    identity: &PeerId,
    peer_id: &PeerId,
    session: &dyn TransportSession,
) -> Result<(), FailureReason> {
    let offer = session
        .local_offer()
        .await
        .map_err(|e| FailureReason::NegotiationFailed { reason: e.0 })?;
    let mut backoff = core.config.retry.backoff();

    loop {
        let attempt = write(&core.registry).record_attempt(peer_id);
        core.stats.signaling_attempts.inc();

        match core
            .signaling
            .exchange_offer(identity, peer_id, offer.clone())
            .await
        {
            Ok(answer) => {
                return session
                    .apply_answer(answer)
                    .await
                    .map_err(|e| FailureReason::NegotiationFailed { reason: e.0 });
            }
            Err(SignalingError::Rejected { reason }) => {
                return Err(FailureReason::SignalingRejected { reason });
            }
            Err(e) if e.is_transient() => {
                let Some(delay) = backoff.next_delay() else {
                    return Err(FailureReason::SignalingTimeout { attempts: attempt });
                };
                core.stats.retries.inc();
                debug!(peer = %peer_id.short(), attempt, ?delay, "signaling failed, retrying: {e}");
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                return Err(FailureReason::SignalingRejected {
                    reason: e.to_string(),
                });
            }
        }
    }
}

async fn announce_loop(core: Arc<ManagerCore>, identity: PeerId, cancel: CancellationToken) {
    let mut cycles = core.signaling.announce_cycles(identity, cancel);
    while let Some(round) = cycles.next().await {
        match round {
            Ok(round) => core.on_round(round),
            Err(e) => core.on_round_failed(e),
        }
    }
}
