use std::io::Write;
use std::time::Instant;

use sat_peers::{FailureReason, ManagerStats, PeerEvent, PeerOrigin, PeerSnapshot, PeerState};
use sat_signal::{AnnounceEndpoint, PeerId};
use serde::Serialize;

use crate::output;

/// Emit a JSONL event to stdout (flushed immediately for piped output).
/// If --output-dir was provided, also writes to the JSONL file.
pub fn emit<T: Serialize>(event: &T) {
    if let Ok(json) = serde_json::to_string(event) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        let _ = writeln!(lock, "{json}");
        let _ = lock.flush();

        output::write_jsonl_line(&json);
    }
}

/// RFC 3339 UTC timestamp with millisecond precision.
pub fn now_iso() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Serialize)]
pub struct EventStarted {
    pub event: &'static str,
    pub identity: String,
    pub mode: &'static str,
    pub trackers: Vec<String>,
    pub timestamp: String,
}

impl EventStarted {
    pub fn new(identity: &PeerId, mode: &'static str, trackers: &[AnnounceEndpoint]) -> Self {
        Self {
            event: "started",
            identity: identity.to_string(),
            mode,
            trackers: trackers.iter().map(ToString::to_string).collect(),
            timestamp: now_iso(),
        }
    }
}

/// A manager event, stamped.
#[derive(Serialize)]
pub struct EventManager<'a> {
    #[serde(flatten)]
    pub inner: &'a PeerEvent,
    pub timestamp: String,
    pub elapsed_s: f64,
}

impl<'a> EventManager<'a> {
    pub fn new(inner: &'a PeerEvent, start: Instant) -> Self {
        Self {
            inner,
            timestamp: now_iso(),
            elapsed_s: start.elapsed().as_secs_f64(),
        }
    }
}

// ── Discovery ───────────────────────────────────────────────────

#[derive(Serialize)]
pub struct EventDiscovered {
    pub event: &'static str,
    pub peer_id: String,
    pub total: usize,
    pub elapsed_s: f64,
}

#[derive(Serialize)]
pub struct EventAnnounceFailed {
    pub event: &'static str,
    pub error: String,
    pub elapsed_s: f64,
}

// ── Summary ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PeerLine {
    pub peer_id: String,
    pub state: PeerState,
    pub origin: PeerOrigin,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
}

impl From<PeerSnapshot> for PeerLine {
    fn from(snapshot: PeerSnapshot) -> Self {
        Self {
            peer_id: snapshot.peer_id.to_string(),
            state: snapshot.state,
            origin: snapshot.origin,
            attempts: snapshot.attempts,
            failure: snapshot.failure,
        }
    }
}

#[derive(Serialize)]
pub struct EventSummary {
    pub event: &'static str,
    pub identity: String,
    pub peers: Vec<PeerLine>,
    pub stats: ManagerStats,
    pub elapsed_s: f64,
}

#[derive(Serialize)]
pub struct EventDiscoverSummary {
    pub event: &'static str,
    pub identity: String,
    pub distinct_peers: usize,
    pub failed_cycles: u64,
    pub elapsed_s: f64,
}
