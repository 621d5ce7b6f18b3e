//! Integration tests: commands issued from many OS threads at once.
mod common;

use std::collections::HashMap;
use std::sync::{Arc, Barrier, Mutex};
use std::thread::{self, ThreadId};
use std::time::Duration;

use common::*;
use sat_peers::{PeerState, Topic};
use sat_signal::mock::{MockTransport, OfferScript};
use sat_signal::PeerId;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connect_returns_after_its_handlers_ran_on_the_calling_thread() {
    init_tracing();
    let mock = MockTransport::new();
    for peer in ["slow", "fast"] {
        mock.script_offers(&pid(peer), vec![OfferScript::Hang]);
    }
    let manager = manager(&mock, config());
    manager.init("local-1").unwrap();

    let handled: Arc<Mutex<HashMap<PeerId, ThreadId>>> = Arc::default();
    let sink = Arc::clone(&handled);
    manager.subscribe(Topic::PeerConnecting, move |event| {
        if let Some(peer) = event.peer_id() {
            if peer.as_str() == "slow" {
                thread::sleep(Duration::from_millis(300));
            }
            sink.lock().unwrap().insert(peer.clone(), thread::current().id());
        }
        Ok(())
    });

    let m = manager.clone();
    let slow = tokio::task::spawn_blocking(move || m.connect(pid("slow")));
    // Give the slow handler time to start before the second connect.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let m = manager.clone();
    let seen = Arc::clone(&handled);
    let fast = tokio::task::spawn_blocking(move || {
        m.connect(pid("fast"));
        let delivered_on = seen.lock().unwrap().get(&pid("fast")).copied();
        (delivered_on, thread::current().id())
    });

    let (delivered_on, caller) = fast.await.unwrap();
    assert_eq!(delivered_on, Some(caller), "fast handler must run inside connect");

    slow.await.unwrap();
    assert!(handled.lock().unwrap().contains_key(&pid("slow")));
    manager.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallel_connects_to_one_peer_start_one_handshake() {
    const THREADS: usize = 16;
    const CONNECTS: usize = 50;

    let mock = MockTransport::new();
    mock.script_offers(&pid("shared"), vec![OfferScript::Hang]);
    let manager = manager(&mock, config());
    let log = EventLog::attach(&manager);
    manager.init("local-1").unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let mut workers = Vec::with_capacity(THREADS);
    for i in 0..THREADS {
        let m = manager.clone();
        let start = Arc::clone(&barrier);
        workers.push(tokio::task::spawn_blocking(move || {
            start.wait();
            for _ in 0..CONNECTS {
                m.connect(pid("shared"));
            }
            m.connect(pid(&format!("own-{i:02}")));
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    assert_eq!(
        manager.get_peer(&pid("shared")).unwrap().state,
        PeerState::Connecting
    );
    assert_eq!(log.topics_for("shared"), vec![Topic::PeerConnecting]);
    assert_eq!(manager.peer_count(), THREADS + 1);
    assert_eq!(log.count(Topic::PeerConnecting), THREADS + 1);

    let stats = manager.stats();
    assert_eq!(stats.connect_requests.get(), (THREADS * (CONNECTS + 1)) as u64);
    assert_eq!(stats.dedup_hits.get(), (THREADS * CONNECTS - 1) as u64);

    manager.shutdown();
    for peer in manager.peers() {
        assert_eq!(peer.state, PeerState::Closed, "{}", peer.peer_id);
    }
}
