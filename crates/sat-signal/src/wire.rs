//! Tracker wire messages in the WebTorrent tracker JSON dialect.
//!
//! Every frame is a JSON text message with `"action": "announce"`. Replies
//! either carry tracker data (`interval`, `peers`), a relayed answer
//! (`answer` + `offer_id`), or a `"failure reason"`.
use serde::{Deserialize, Serialize};

use crate::{PeerId, SignalingError};

const ACTION_ANNOUNCE: &str = "announce";

/// Whether a session description opens or answers a negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Opaque session description exchanged through the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One offer slot in an announce request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferEntry {
    pub offer_id: String,
    pub offer: SessionDescription,
}

/// Client → tracker frame.
#[derive(Debug, Clone, Serialize)]
pub struct TrackerRequest {
    pub action: &'static str,
    pub info_hash: String,
    pub peer_id: PeerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numwant: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_peer_id: Option<PeerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers: Option<Vec<OfferEntry>>,
}

impl TrackerRequest {
    /// Discovery announce: "I am in this swarm, tell me who else is".
    pub fn announce(swarm: &str, peer_id: &PeerId, numwant: u32) -> Self {
        Self {
            action: ACTION_ANNOUNCE,
            info_hash: swarm.to_string(),
            peer_id: peer_id.clone(),
            numwant: Some(numwant),
            event: Some("started"),
            to_peer_id: None,
            offers: None,
        }
    }

    /// Directed offer relayed by the tracker to `to`.
    pub fn offer(
        swarm: &str,
        from: &PeerId,
        to: &PeerId,
        offer_id: String,
        offer: SessionDescription,
    ) -> Self {
        Self {
            action: ACTION_ANNOUNCE,
            info_hash: swarm.to_string(),
            peer_id: from.clone(),
            numwant: None,
            event: None,
            to_peer_id: Some(to.clone()),
            offers: Some(vec![OfferEntry { offer_id, offer }]),
        }
    }

    pub fn to_json(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self).map_err(SignalingError::Serialization)
    }
}

/// Tracker → client frame. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, rename = "failure reason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, rename = "warning message", skip_serializing_if = "Option::is_none")]
    pub warning_message: Option<String>,
    /// Seconds the tracker wants between announces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<SessionDescription>,
}

impl TrackerMessage {
    pub fn from_json(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(SignalingError::Deserialization)
    }

    /// Tracker-level reply to a discovery announce.
    pub fn is_announce_reply(&self) -> bool {
        self.action.as_deref() == Some(ACTION_ANNOUNCE)
            && (self.interval.is_some() || self.peers.is_some())
    }

    /// Answer relayed for the given offer.
    pub fn answer_for(&self, offer_id: &str) -> Option<&SessionDescription> {
        match (&self.offer_id, &self.answer) {
            (Some(id), Some(answer)) if id == offer_id && answer.kind == SdpKind::Answer => {
                Some(answer)
            }
            _ => None,
        }
    }

    /// Valid peer ids from the `peers` list. Malformed entries are dropped.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers
            .iter()
            .flatten()
            .filter_map(|raw| PeerId::new(raw.as_str()).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PeerId {
        PeerId::new(s).unwrap()
    }

    #[test]
    fn announce_request_format() {
        let req = TrackerRequest::announce("room", &pid("local-1"), 20);
        let json = req.to_json().unwrap();
        assert!(json.contains("\"action\":\"announce\""));
        assert!(json.contains("\"info_hash\":\"room\""));
        assert!(json.contains("\"peer_id\":\"local-1\""));
        assert!(json.contains("\"numwant\":20"));
        assert!(json.contains("\"event\":\"started\""));
        assert!(!json.contains("to_peer_id"));
        assert!(!json.contains("offers"));
    }

    #[test]
    fn offer_request_format() {
        let req = TrackerRequest::offer(
            "room",
            &pid("local-1"),
            &pid("peer-a"),
            "o-1".into(),
            SessionDescription::offer("v=0"),
        );
        let json = req.to_json().unwrap();
        assert!(json.contains("\"to_peer_id\":\"peer-a\""));
        assert!(json.contains("\"offer_id\":\"o-1\""));
        assert!(json.contains("\"type\":\"offer\""));
        assert!(!json.contains("numwant"));
    }

    #[test]
    fn parse_tracker_failure() {
        let msg = TrackerMessage::from_json(r#"{"failure reason":"invalid info_hash"}"#).unwrap();
        assert_eq!(msg.failure_reason.as_deref(), Some("invalid info_hash"));
        assert!(!msg.is_announce_reply());
    }

    #[test]
    fn parse_announce_reply_skips_bad_peers() {
        let msg = TrackerMessage::from_json(
            r#"{"action":"announce","interval":120,"info_hash":"room","peers":["peer-a","","peer b","peer-c"]}"#,
        )
        .unwrap();
        assert!(msg.is_announce_reply());
        assert_eq!(msg.interval, Some(120));
        assert_eq!(msg.peer_ids(), vec![pid("peer-a"), pid("peer-c")]);
    }

    #[test]
    fn answer_matches_offer_id() {
        let msg = TrackerMessage::from_json(
            r#"{"action":"announce","peer_id":"peer-a","offer_id":"o-1","answer":{"type":"answer","sdp":"v=0"}}"#,
        )
        .unwrap();
        assert_eq!(msg.answer_for("o-1"), Some(&SessionDescription::answer("v=0")));
        assert!(msg.answer_for("o-2").is_none());
    }
}
