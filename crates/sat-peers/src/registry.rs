//! Authoritative map of known peers.
//!
//! Reads are public. Mutations are crate-private and only the lifecycle
//! controller calls them, under the manager's registry write lock.
use std::collections::HashMap;
use std::time::Duration;

use sat_signal::PeerId;
use tokio::time::Instant;

use crate::error::{FailureReason, PeerError};
use crate::types::{PeerOrigin, PeerSnapshot, PeerState, SessionId};

#[derive(Debug, Clone)]
struct PeerRecord {
    state: PeerState,
    origin: PeerOrigin,
    session: Option<SessionId>,
    attempts: u32,
    failure: Option<FailureReason>,
    last_activity: Instant,
}

/// A committed state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: PeerState,
    pub(crate) to: PeerState,
    /// Session detached by this change, to be released by the caller.
    pub(crate) released: Option<SessionId>,
}

#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<PeerSnapshot> {
        self.peers.get(peer_id).map(|r| snapshot(peer_id, r))
    }

    pub fn state(&self, peer_id: &PeerId) -> Option<PeerState> {
        self.peers.get(peer_id).map(|r| r.state)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Every record, sorted by peer id.
    pub fn peers(&self) -> Vec<PeerSnapshot> {
        let mut out: Vec<_> = self.peers.iter().map(|(id, r)| snapshot(id, r)).collect();
        out.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        out
    }

    pub fn count_in(&self, state: PeerState) -> usize {
        self.peers.values().filter(|r| r.state == state).count()
    }

    /// Connected peers with no successful exchange for longer than `max_idle`.
    pub fn stale_peers(&self, max_idle: Duration) -> Vec<PeerId> {
        let now = Instant::now();
        let mut out: Vec<_> = self
            .peers
            .iter()
            .filter(|(_, r)| {
                r.state == PeerState::Connected
                    && now.saturating_duration_since(r.last_activity) > max_idle
            })
            .map(|(id, _)| id.clone())
            .collect();
        out.sort();
        out
    }

    pub(crate) fn session_of(&self, peer_id: &PeerId) -> Option<SessionId> {
        self.peers.get(peer_id).and_then(|r| r.session)
    }

    /// Add a record in `Discovered`. Returns `false` (and changes nothing)
    /// if the peer is already known.
    pub(crate) fn insert(&mut self, peer_id: PeerId, origin: PeerOrigin) -> bool {
        if self.peers.contains_key(&peer_id) {
            return false;
        }
        self.peers.insert(
            peer_id,
            PeerRecord {
                state: PeerState::Discovered,
                origin,
                session: None,
                attempts: 0,
                failure: None,
                last_activity: Instant::now(),
            },
        );
        true
    }

    pub(crate) fn remove(&mut self, peer_id: &PeerId) -> Option<PeerSnapshot> {
        self.peers.remove(peer_id).map(|r| snapshot(peer_id, &r))
    }

    /// Move a peer along an allowed edge. Entering `Failed` or `Closed`
    /// detaches the session.
    pub(crate) fn transition(
        &mut self,
        peer_id: &PeerId,
        to: PeerState,
    ) -> Result<Transition, PeerError> {
        let record = self.peers.get_mut(peer_id).ok_or_else(|| PeerError::UnknownPeer {
            peer_id: peer_id.clone(),
        })?;
        let from = record.state;
        if !from.can_transition_to(to) {
            return Err(PeerError::InvalidTransition {
                peer_id: peer_id.clone(),
                from,
                to,
            });
        }

        record.state = to;
        let released = if to.is_terminal() {
            record.session.take()
        } else {
            None
        };
        Ok(Transition { from, to, released })
    }

    /// `Discovered → Connecting`, taking ownership of `session`.
    pub(crate) fn start_connecting(
        &mut self,
        peer_id: &PeerId,
        session: SessionId,
    ) -> Result<Transition, PeerError> {
        let change = self.transition(peer_id, PeerState::Connecting)?;
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.session = Some(session);
            record.attempts = 0;
            record.failure = None;
        }
        Ok(change)
    }

    /// `Connecting → Failed`, recording the reason.
    pub(crate) fn fail(
        &mut self,
        peer_id: &PeerId,
        reason: FailureReason,
    ) -> Result<Transition, PeerError> {
        let change = self.transition(peer_id, PeerState::Failed)?;
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.failure = Some(reason);
        }
        Ok(change)
    }

    /// Count one signaling attempt; returns the running total.
    pub(crate) fn record_attempt(&mut self, peer_id: &PeerId) -> u32 {
        match self.peers.get_mut(peer_id) {
            Some(record) => {
                record.attempts += 1;
                record.attempts
            }
            None => 0,
        }
    }

    pub(crate) fn touch(&mut self, peer_id: &PeerId) {
        if let Some(record) = self.peers.get_mut(peer_id) {
            record.last_activity = Instant::now();
        }
    }
}

fn snapshot(peer_id: &PeerId, record: &PeerRecord) -> PeerSnapshot {
    PeerSnapshot {
        peer_id: peer_id.clone(),
        state: record.state,
        origin: record.origin,
        attempts: record.attempts,
        failure: record.failure.clone(),
        session: record.session,
        last_activity: record.last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pid(s: &str) -> PeerId {
        PeerId::new(s).unwrap()
    }

    fn connecting(reg: &mut PeerRegistry, s: &str, session: u64) -> PeerId {
        let id = pid(s);
        assert!(reg.insert(id.clone(), PeerOrigin::Requested));
        reg.start_connecting(&id, SessionId(session)).unwrap();
        id
    }

    #[test]
    fn insert_is_unique() {
        let mut reg = PeerRegistry::new();
        assert!(reg.insert(pid("peer-a"), PeerOrigin::Requested));
        assert!(!reg.insert(pid("peer-a"), PeerOrigin::Announced));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get(&pid("peer-a")).unwrap().origin, PeerOrigin::Requested);
    }

    #[test]
    fn session_held_only_while_active() {
        let mut reg = PeerRegistry::new();
        let a = connecting(&mut reg, "peer-a", 1);
        assert_eq!(reg.session_of(&a), Some(SessionId(1)));

        reg.transition(&a, PeerState::Connected).unwrap();
        assert_eq!(reg.session_of(&a), Some(SessionId(1)));

        let change = reg.transition(&a, PeerState::Closed).unwrap();
        assert_eq!(change.released, Some(SessionId(1)));
        assert_eq!(reg.session_of(&a), None);
    }

    #[test]
    fn fail_records_reason_and_releases() {
        let mut reg = PeerRegistry::new();
        let a = connecting(&mut reg, "peer-a", 7);
        let change = reg.fail(&a, FailureReason::Cancelled).unwrap();
        assert_eq!(change.released, Some(SessionId(7)));
        let snap = reg.get(&a).unwrap();
        assert_eq!(snap.state, PeerState::Failed);
        assert_eq!(snap.failure, Some(FailureReason::Cancelled));
    }

    #[test]
    fn unknown_peer() {
        let mut reg = PeerRegistry::new();
        let err = reg.transition(&pid("ghost"), PeerState::Closed).unwrap_err();
        assert!(matches!(err, PeerError::UnknownPeer { .. }));
    }

    #[test]
    fn counts_by_state() {
        let mut reg = PeerRegistry::new();
        connecting(&mut reg, "peer-a", 1);
        let b = connecting(&mut reg, "peer-b", 2);
        reg.transition(&b, PeerState::Connected).unwrap();
        assert_eq!(reg.count_in(PeerState::Connecting), 1);
        assert_eq!(reg.count_in(PeerState::Connected), 1);
        assert_eq!(reg.count_in(PeerState::Closed), 0);
        let ids: Vec<_> = reg.peers().into_iter().map(|p| p.peer_id).collect();
        assert_eq!(ids, vec![pid("peer-a"), pid("peer-b")]);
    }

    #[test]
    fn attempts_reset_per_cycle() {
        let mut reg = PeerRegistry::new();
        let a = connecting(&mut reg, "peer-a", 1);
        reg.record_attempt(&a);
        assert_eq!(reg.record_attempt(&a), 2);
        assert_eq!(reg.record_attempt(&pid("ghost")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_peers_only_lists_idle_connected() {
        let mut reg = PeerRegistry::new();
        let a = connecting(&mut reg, "peer-a", 1);
        let b = connecting(&mut reg, "peer-b", 2);
        connecting(&mut reg, "peer-c", 3);
        reg.transition(&a, PeerState::Connected).unwrap();
        reg.transition(&b, PeerState::Connected).unwrap();

        tokio::time::advance(Duration::from_secs(90)).await;
        reg.touch(&b);
        assert_eq!(reg.stale_peers(Duration::from_secs(60)), vec![a]);
    }

    fn any_state() -> impl Strategy<Value = PeerState> {
        prop::sample::select(PeerState::ALL.to_vec())
    }

    proptest! {
        /// Random transition requests: allowed edges commit, everything
        /// else fails and leaves the record untouched.
        #[test]
        fn only_allowed_edges_commit(targets in prop::collection::vec(any_state(), 1..20)) {
            let mut reg = PeerRegistry::new();
            let id = pid("peer-a");
            reg.insert(id.clone(), PeerOrigin::Requested);

            for to in targets {
                let before = reg.get(&id).unwrap();
                let result = if to == PeerState::Connecting && before.state == PeerState::Discovered {
                    reg.start_connecting(&id, SessionId(1))
                } else {
                    reg.transition(&id, to)
                };
                let after = reg.get(&id).unwrap();

                if before.state.can_transition_to(to) {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(after.state, to);
                } else {
                    let is_invalid = matches!(result, Err(PeerError::InvalidTransition { .. }));
                    prop_assert!(is_invalid);
                    prop_assert_eq!(&after, &before);
                }
                prop_assert_eq!(after.session.is_some(), after.state.is_active());
            }
        }
    }
}
