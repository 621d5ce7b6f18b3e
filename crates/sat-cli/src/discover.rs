use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use sat_signal::{PeerId, SignalingClient, SignalingConfig, WsTracker};
use tracing::debug;

use crate::events::{
    emit, EventAnnounceFailed, EventDiscoverSummary, EventDiscovered, EventStarted,
};

pub async fn run(
    identity: PeerId,
    signaling: SignalingConfig,
    limit: Option<usize>,
    start: Instant,
) -> anyhow::Result<()> {
    let transport = Arc::new(WsTracker::new(signaling.swarm_key(), signaling.wanted()));
    let client = SignalingClient::new(signaling, transport);

    emit(&EventStarted::new(&identity, "discover", &client.endpoints()));
    eprintln!("Discovering as {identity}");
    eprintln!("Press Ctrl+C to stop.\n");

    let mut stream = client.announce(identity.clone());
    let mut seen: HashSet<PeerId> = HashSet::new();
    let mut failed_cycles = 0u64;

    loop {
        let item = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCtrl+C received, shutting down...");
                break;
            }
            item = stream.next() => item,
        };

        match item {
            None => break,
            Some(Ok(peer)) => {
                if !seen.insert(peer.clone()) {
                    debug!(peer = %peer, "already seen");
                    continue;
                }
                emit(&EventDiscovered {
                    event: "discovered",
                    peer_id: peer.to_string(),
                    total: seen.len(),
                    elapsed_s: start.elapsed().as_secs_f64(),
                });
                if limit.is_some_and(|limit| seen.len() >= limit) {
                    break;
                }
            }
            Some(Err(e)) => {
                failed_cycles += 1;
                emit(&EventAnnounceFailed {
                    event: "announce_failed",
                    error: e.to_string(),
                    elapsed_s: start.elapsed().as_secs_f64(),
                });
            }
        }
    }
    stream.cancel();

    emit(&EventDiscoverSummary {
        event: "summary",
        identity: identity.to_string(),
        distinct_peers: seen.len(),
        failed_cycles,
        elapsed_s: start.elapsed().as_secs_f64(),
    });
    eprintln!("\n{identity}: {} distinct peers.", seen.len());
    Ok(())
}
