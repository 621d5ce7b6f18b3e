use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sat_signal::{parse_endpoints, SignalingConfig};

use crate::Cli;

/// Signaling config from the global flags.
pub fn signaling_config(cli: &Cli) -> anyhow::Result<SignalingConfig> {
    let mut config = SignalingConfig::new()
        .request_timeout(Duration::from_millis(cli.timeout))
        .announce_interval(Duration::from_millis(cli.interval));
    if !cli.announce.is_empty() {
        config = config.endpoints(parse_endpoints(&cli.announce)?);
    }
    if let Some(swarm) = &cli.swarm {
        config = config.swarm(swarm.as_str());
    }
    Ok(config)
}

/// Flag that stays `true` until the first Ctrl+C.
pub fn stop_on_ctrlc(what: &'static str) -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCtrl+C received, stopping {what}...");
        }
        flag.store(false, Ordering::Relaxed);
    });
    running
}
