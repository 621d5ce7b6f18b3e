#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sat_peers::{
    ManagerConfig, NegotiationError, PeerEvent, PeerManager, SessionFactory, Topic,
    TransportSession,
};
use sat_signal::mock::MockTransport;
use sat_signal::{parse_endpoints, PeerId, SessionDescription, SignalingConfig};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

pub fn pid(s: &str) -> PeerId {
    PeerId::new(s).unwrap()
}

pub fn signaling(urls: &[&str]) -> SignalingConfig {
    SignalingConfig::new()
        .endpoints(parse_endpoints(urls).unwrap())
        .request_timeout(Duration::from_secs(2))
        .announce_interval(Duration::from_secs(30))
}

/// One endpoint, no auto-connect: only explicit connects touch the registry.
pub fn config() -> ManagerConfig {
    ManagerConfig::new()
        .signaling(signaling(&["wss://a.example.org"]))
        .auto_connect(false)
}

pub fn manager(mock: &MockTransport, config: ManagerConfig) -> PeerManager {
    PeerManager::new(config, Arc::new(mock.clone())).unwrap()
}

/// Let spawned handshakes run. Time is paused, so this only advances the
/// clock as far as the next pending timer.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Every event the manager published, in delivery order.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<PeerEvent>>>);

impl EventLog {
    pub fn attach(manager: &PeerManager) -> Self {
        let log = Self::default();
        let sink = log.clone();
        manager.subscribe_all(move |event| {
            sink.push(event);
            Ok(())
        });
        log
    }

    pub fn push(&self, event: &PeerEvent) {
        self.0.lock().unwrap().push(event.clone());
    }

    pub fn events(&self) -> Vec<PeerEvent> {
        self.0.lock().unwrap().clone()
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.events().iter().map(PeerEvent::topic).collect()
    }

    pub fn for_peer(&self, peer: &str) -> Vec<PeerEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.peer_id().map(PeerId::as_str) == Some(peer))
            .collect()
    }

    pub fn topics_for(&self, peer: &str) -> Vec<Topic> {
        self.for_peer(peer).iter().map(PeerEvent::topic).collect()
    }

    pub fn count(&self, topic: Topic) -> usize {
        self.events().iter().filter(|e| e.topic() == topic).count()
    }
}

/// Per-peer lifecycle: repeated cycles of
/// `Connecting, (Connected | Failed), [Closed]`, where a cycle may stop
/// early only at the end of the log.
pub fn assert_cycle_order(peer: &str, topics: &[Topic]) {
    let mut rest = topics;
    while let Some((first, tail)) = rest.split_first() {
        if *first == Topic::PeerDiscovered {
            rest = tail;
            continue;
        }
        assert_eq!(*first, Topic::PeerConnecting, "{peer}: {topics:?}");
        rest = tail;
        match rest.split_first() {
            None => return,
            Some((Topic::PeerConnected | Topic::PeerFailed, tail)) => rest = tail,
            Some(_) => panic!("{peer}: outcome expected after Connecting: {topics:?}"),
        }
        if let Some((Topic::PeerClosed, tail)) = rest.split_first() {
            rest = tail;
        }
    }
}

/// Session factory that counts opens and closes.
#[derive(Default)]
pub struct RecordingFactory {
    pub opened: AtomicUsize,
    pub closed: Arc<AtomicUsize>,
    reject_answers: bool,
}

impl RecordingFactory {
    pub fn rejecting() -> Self {
        Self {
            reject_answers: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SessionFactory for RecordingFactory {
    fn open(&self, _peer_id: &PeerId) -> Arc<dyn TransportSession> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Arc::new(RecordingSession {
            closed: self.closed.clone(),
            reject: self.reject_answers,
        })
    }
}

struct RecordingSession {
    closed: Arc<AtomicUsize>,
    reject: bool,
}

#[async_trait::async_trait]
impl TransportSession for RecordingSession {
    async fn local_offer(&self) -> Result<SessionDescription, NegotiationError> {
        Ok(SessionDescription::offer("test-offer"))
    }

    async fn apply_answer(&self, _answer: SessionDescription) -> Result<(), NegotiationError> {
        if self.reject {
            return Err(NegotiationError("fingerprint mismatch".into()));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
