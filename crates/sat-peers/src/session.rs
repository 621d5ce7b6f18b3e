//! Transport sessions and their ownership table.
//!
//! A peer record never holds a session directly: it holds a [`SessionId`]
//! into the [`SessionTable`], which owns the session and closes it when the
//! entry is released or the table is dropped.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use sat_signal::{PeerId, SdpKind, SessionDescription};
use tracing::debug;

use crate::types::SessionId;

/// The local session refused to proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct NegotiationError(pub String);

/// One direct transport session with a remote peer.
#[async_trait::async_trait]
pub trait TransportSession: Send + Sync {
    /// Local offer to relay to the peer.
    async fn local_offer(&self) -> Result<SessionDescription, NegotiationError>;

    /// Apply the peer's answer. On success the session is usable.
    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), NegotiationError>;

    /// Release the underlying transport. Called exactly once.
    fn close(&self);
}

/// Opens sessions for the lifecycle controller.
pub trait SessionFactory: Send + Sync {
    fn open(&self, peer_id: &PeerId) -> Arc<dyn TransportSession>;
}

/// Session that completes once a well-formed answer comes back. Carries no
/// media; used when only the signaling outcome matters.
pub struct SignalOnlySession {
    peer_id: PeerId,
    serial: u64,
    closed: AtomicBool,
}

impl SignalOnlySession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait::async_trait]
impl TransportSession for SignalOnlySession {
    async fn local_offer(&self) -> Result<SessionDescription, NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError("session closed".into()));
        }
        Ok(SessionDescription::offer(format!(
            "v=0\r\no=- {} 1 IN IP4 0.0.0.0\r\ns=sat/{}\r\nt=0 0\r\n",
            self.serial, self.peer_id
        )))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<(), NegotiationError> {
        if self.is_closed() {
            return Err(NegotiationError("session closed".into()));
        }
        if answer.kind != SdpKind::Answer || answer.sdp.trim().is_empty() {
            return Err(NegotiationError(format!(
                "unusable answer from {}",
                self.peer_id
            )));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Default factory producing [`SignalOnlySession`]s.
#[derive(Debug, Default)]
pub struct SignalOnlyFactory {
    serial: AtomicU64,
}

impl SessionFactory for SignalOnlyFactory {
    fn open(&self, peer_id: &PeerId) -> Arc<dyn TransportSession> {
        Arc::new(SignalOnlySession {
            peer_id: peer_id.clone(),
            serial: self.serial.fetch_add(1, Ordering::Relaxed),
            closed: AtomicBool::new(false),
        })
    }
}

/// Arena of open sessions keyed by [`SessionId`].
#[derive(Default)]
pub(crate) struct SessionTable {
    next: u64,
    sessions: HashMap<SessionId, Arc<dyn TransportSession>>,
}

impl SessionTable {
    pub(crate) fn insert(&mut self, session: Arc<dyn TransportSession>) -> SessionId {
        self.next += 1;
        let id = SessionId(self.next);
        self.sessions.insert(id, session);
        id
    }

    /// Remove and close. Returns `false` if `id` was already released.
    pub(crate) fn release(&mut self, id: SessionId) -> bool {
        match self.sessions.remove(&id) {
            Some(session) => {
                session.close();
                debug!(%id, "session released");
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.len()
    }
}

impl Drop for SessionTable {
    fn drop(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(factory: &SignalOnlyFactory) -> Arc<dyn TransportSession> {
        factory.open(&PeerId::new("peer-a").unwrap())
    }

    #[tokio::test]
    async fn signal_only_accepts_answers_only() {
        let factory = SignalOnlyFactory::default();
        let session = open(&factory);
        let offer = session.local_offer().await.unwrap();
        assert_eq!(offer.kind, SdpKind::Offer);
        assert!(offer.sdp.contains("sat/peer-a"));

        assert!(session
            .apply_answer(SessionDescription::offer("v=0"))
            .await
            .is_err());
        assert!(session
            .apply_answer(SessionDescription::answer("v=0"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn closed_session_refuses_negotiation() {
        let factory = SignalOnlyFactory::default();
        let session = open(&factory);
        session.close();
        assert!(session.local_offer().await.is_err());
    }

    #[test]
    fn release_closes_once() {
        let factory = SignalOnlyFactory::default();
        let mut table = SessionTable::default();
        let session = open(&factory);
        let id = table.insert(session.clone());

        assert!(table.release(id));
        assert!(!table.release(id));
        assert_eq!(table.len(), 0);
        assert!(refuses_offer(&session));
    }

    #[test]
    fn drop_closes_remaining() {
        let factory = SignalOnlyFactory::default();
        let mut table = SessionTable::default();
        let session = open(&factory);
        table.insert(session.clone());
        drop(table);
        assert!(refuses_offer(&session));
    }

    fn refuses_offer(session: &Arc<dyn TransportSession>) -> bool {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(session.local_offer())
            .is_err()
    }
}
