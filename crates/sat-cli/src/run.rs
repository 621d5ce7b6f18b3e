use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use sat_peers::{ManagerConfig, PeerManager, PeerState};
use sat_signal::{PeerId, SignalingConfig};
use tracing::info;

use crate::common::stop_on_ctrlc;
use crate::events::{emit, EventManager, EventStarted, EventSummary, PeerLine};

pub struct RunConfig {
    pub identity: PeerId,
    pub signaling: SignalingConfig,
    /// Issued before `init`, so they go through the pending queue.
    pub connect: Vec<PeerId>,
    pub auto_connect: bool,
    pub max_retries: u32,
    pub status_interval_s: u64,
}

pub async fn run(config: RunConfig, start: Instant) -> anyhow::Result<()> {
    let manager_config = ManagerConfig::new()
        .signaling(config.signaling)
        .max_retries(config.max_retries)
        .auto_connect(config.auto_connect);
    let manager = PeerManager::with_trackers(manager_config)?;

    manager.subscribe_all(move |event| {
        emit(&EventManager::new(event, start));
        Ok(())
    });

    for peer in config.connect {
        manager.connect(peer);
    }

    emit(&EventStarted::new(
        &config.identity,
        "run",
        &manager.announce_urls(),
    ));
    manager.init(config.identity.as_str())?;

    eprintln!("Running as {}", config.identity);
    eprintln!("Press Ctrl+C to stop.\n");

    let running = stop_on_ctrlc("peer manager");
    let status_every = Duration::from_secs(config.status_interval_s);
    let mut last_status = Instant::now();

    while running.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(500)).await;

        if !status_every.is_zero() && last_status.elapsed() >= status_every {
            last_status = Instant::now();
            eprintln!(
                "  [{}] peers: {} connected, {} connecting, {} failed (elapsed: {:.1}s)",
                config.identity,
                manager.count_in(PeerState::Connected),
                manager.count_in(PeerState::Connecting),
                manager.count_in(PeerState::Failed),
                start.elapsed().as_secs_f64(),
            );
        }
    }

    info!(peers = manager.peer_count(), "stopping manager");
    manager.shutdown();

    emit(&EventSummary {
        event: "summary",
        identity: config.identity.to_string(),
        peers: manager.peers().into_iter().map(PeerLine::from).collect(),
        stats: manager.stats(),
        elapsed_s: start.elapsed().as_secs_f64(),
    });
    Ok(())
}
