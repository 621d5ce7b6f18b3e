//! Lifecycle events and their synchronous publish/subscribe fan-out.
//!
//! Handlers run before the command that produced the event returns, in
//! subscription order. A handler that returns `Err` or panics is logged and
//! counted; delivery continues with the next handler.
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use sat_metrics::Counter;
use sat_signal::PeerId;
use serde::Serialize;
use tracing::warn;

use crate::error::FailureReason;
use crate::types::PeerOrigin;

/// Event category a handler subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Initialized,
    PeerDiscovered,
    PeerConnecting,
    PeerConnected,
    PeerFailed,
    PeerClosed,
    /// Every announce endpoint failed in a cycle.
    Degraded,
    /// An announce cycle succeeded after `Degraded`.
    Recovered,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::Initialized,
        Topic::PeerDiscovered,
        Topic::PeerConnecting,
        Topic::PeerConnected,
        Topic::PeerFailed,
        Topic::PeerClosed,
        Topic::Degraded,
        Topic::Recovered,
    ];
}

/// A state change published by the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PeerEvent {
    Initialized { identity: PeerId },
    PeerDiscovered { peer_id: PeerId },
    PeerConnecting { peer_id: PeerId, origin: PeerOrigin },
    PeerConnected { peer_id: PeerId },
    PeerFailed { peer_id: PeerId, reason: FailureReason },
    PeerClosed { peer_id: PeerId },
    Degraded { attempted: usize },
    Recovered { reachable: usize },
}

impl PeerEvent {
    pub fn topic(&self) -> Topic {
        match self {
            PeerEvent::Initialized { .. } => Topic::Initialized,
            PeerEvent::PeerDiscovered { .. } => Topic::PeerDiscovered,
            PeerEvent::PeerConnecting { .. } => Topic::PeerConnecting,
            PeerEvent::PeerConnected { .. } => Topic::PeerConnected,
            PeerEvent::PeerFailed { .. } => Topic::PeerFailed,
            PeerEvent::PeerClosed { .. } => Topic::PeerClosed,
            PeerEvent::Degraded { .. } => Topic::Degraded,
            PeerEvent::Recovered { .. } => Topic::Recovered,
        }
    }

    /// The peer this event is about, if any.
    pub fn peer_id(&self) -> Option<&PeerId> {
        match self {
            PeerEvent::PeerDiscovered { peer_id }
            | PeerEvent::PeerConnecting { peer_id, .. }
            | PeerEvent::PeerConnected { peer_id }
            | PeerEvent::PeerFailed { peer_id, .. }
            | PeerEvent::PeerClosed { peer_id } => Some(peer_id),
            PeerEvent::Initialized { .. }
            | PeerEvent::Degraded { .. }
            | PeerEvent::Recovered { .. } => None,
        }
    }
}

/// Error type handlers may return.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&PeerEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    /// `None` subscribes to every topic.
    topic: Option<Topic>,
    handler: Handler,
}

/// Per-manager subscriber list.
#[derive(Default)]
pub struct EventEmitter {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
    failures: Counter,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&PeerEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(Some(topic), Arc::new(handler))
    }

    /// Subscribe to every topic.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PeerEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(handler))
    }

    /// Returns `false` if the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    /// Deliver `event` to the handlers subscribed right now. Returns how
    /// many handlers completed without error.
    pub fn emit(&self, event: &PeerEvent) -> usize {
        let topic = event.topic();
        let handlers: Vec<(SubscriptionId, Handler)> = self
            .subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.topic.map_or(true, |t| t == topic))
            .map(|s| (s.id, s.handler.clone()))
            .collect();

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    self.failures.inc();
                    warn!(subscription = id.0, ?topic, "event handler failed: {e}");
                }
                Err(_) => {
                    self.failures.inc();
                    warn!(subscription = id.0, ?topic, "event handler panicked");
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscriptions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.topic.map_or(true, |t| t == topic))
            .count()
    }

    /// Handler errors and panics observed so far.
    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    fn insert(&self, topic: Option<Topic>, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscription { id, topic, handler });
        id
    }
}

/// Sequence shared by every outbox so a thread's last push is comparable
/// across managers.
static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Sequence of the last event this thread pushed, into any outbox.
    static LAST_PUSHED: Cell<u64> = const { Cell::new(0) };
    /// Outboxes this thread is currently delivering from.
    static DELIVERING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Commit-ordered event buffer in front of an [`EventEmitter`].
///
/// Events are pushed while the registry lock is held, so the buffer order
/// is the commit order. `flush` runs with no lock held and returns only
/// once everything the calling thread pushed has been delivered; callers
/// take turns on a delivery lock, so deliveries never interleave.
///
/// A flush from inside a handler of the same outbox returns at once; the
/// enclosing flush on that thread picks the new events up.
#[derive(Default)]
pub(crate) struct Outbox {
    pending: Mutex<VecDeque<(u64, PeerEvent)>>,
    delivery: Mutex<()>,
}

impl Outbox {
    pub(crate) fn push(&self, event: PeerEvent) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
        pending.push_back((seq, event));
        LAST_PUSHED.with(|last| last.set(seq));
    }

    pub(crate) fn flush(&self, emitter: &EventEmitter) {
        let key = self as *const Self as usize;
        if DELIVERING.with(|d| d.borrow().contains(&key)) {
            return;
        }

        let _turn = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let _mark = DeliveryMark::enter(key);
        // Re-read each round: handlers running here may push more.
        while let Some(event) = self.pop_through(LAST_PUSHED.with(Cell::get)) {
            emitter.emit(&event);
        }
    }

    /// Front event if it was pushed no later than `horizon`.
    fn pop_through(&self, horizon: u64) -> Option<PeerEvent> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        match pending.front() {
            Some((seq, _)) if *seq <= horizon => pending.pop_front().map(|(_, event)| event),
            _ => None,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Marks an outbox as being delivered on this thread until dropped.
struct DeliveryMark(usize);

impl DeliveryMark {
    fn enter(key: usize) -> Self {
        DELIVERING.with(|d| d.borrow_mut().push(key));
        Self(key)
    }
}

impl Drop for DeliveryMark {
    fn drop(&mut self) {
        DELIVERING.with(|d| d.borrow_mut().retain(|k| *k != self.0));
    }
}
