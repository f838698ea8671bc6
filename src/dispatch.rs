//! Inbound frame classification for the push channel.
//!
//! Frames are JSON objects tagged by `type`, except the heartbeat reply which
//! is the bare text `pong`. Anything that fails to decode is dropped here;
//! the server may introduce new event types at any time, so unknown tags are
//! logged and ignored rather than treated as errors.

use crate::ledger::LedgerKey;
use crate::types::CallId;
use log::{debug, trace, warn};
use serde::Deserialize;

/// The reply to our liveness probe. Not JSON, discarded silently.
pub const HEARTBEAT_REPLY: &str = "pong";

/// The liveness probe itself.
pub const HEARTBEAT_PROBE: &str = "ping";

/// A decoded push notification. These are hints, not facts: any event that
/// implies a roster change only triggers an authoritative re-fetch.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    ConnectionEstablished {
        #[serde(default)]
        is_reconnect: bool,
    },
    IncomingCall {
        call_id: CallId,
        caller_name: String,
        caller_id: String,
        room_name: String,
        #[serde(default)]
        seq: Option<i64>,
    },
    CallAccepted {
        call_id: CallId,
        #[serde(default)]
        accepter_name: Option<String>,
        #[serde(default)]
        seq: Option<i64>,
    },
    ParticipantJoined {
        call_id: CallId,
        #[serde(default)]
        participant_name: Option<String>,
        #[serde(default)]
        seq: Option<i64>,
    },
    ParticipantLeft {
        call_id: CallId,
        #[serde(default)]
        participant_name: Option<String>,
        #[serde(default)]
        seq: Option<i64>,
    },
    CallEnded {
        call_id: CallId,
        #[serde(default)]
        seq: Option<i64>,
    },
    RecordingStarted {
        call_id: CallId,
        #[serde(default)]
        seq: Option<i64>,
    },
    #[serde(other)]
    Unknown,
}

impl PushEvent {
    /// Wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::IncomingCall { .. } => "incoming_call",
            Self::CallAccepted { .. } => "call_accepted",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::CallEnded { .. } => "call_ended",
            Self::RecordingStarted { .. } => "recording_started",
            Self::Unknown => "unknown",
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Self::IncomingCall { call_id, .. }
            | Self::CallAccepted { call_id, .. }
            | Self::ParticipantJoined { call_id, .. }
            | Self::ParticipantLeft { call_id, .. }
            | Self::CallEnded { call_id, .. }
            | Self::RecordingStarted { call_id, .. } => Some(call_id),
            Self::ConnectionEstablished { .. } | Self::Unknown => None,
        }
    }

    fn seq(&self) -> Option<i64> {
        match self {
            Self::IncomingCall { seq, .. }
            | Self::CallAccepted { seq, .. }
            | Self::ParticipantJoined { seq, .. }
            | Self::ParticipantLeft { seq, .. }
            | Self::CallEnded { seq, .. }
            | Self::RecordingStarted { seq, .. } => *seq,
            Self::ConnectionEstablished { .. } | Self::Unknown => None,
        }
    }

    /// Key for duplicate suppression. Events without a call id are never
    /// deduplicated; they carry no session effect to repeat.
    pub fn ledger_key(&self) -> Option<LedgerKey> {
        self.call_id().map(|call_id| LedgerKey {
            call_id: call_id.clone(),
            event_type: self.kind(),
            seq: self.seq(),
        })
    }
}

/// Classifies one raw frame. Returns `None` for the heartbeat reply,
/// undecodable payloads and unknown event types; all three are dropped
/// without reaching the session state machine.
pub fn decode_frame(raw: &str) -> Option<PushEvent> {
    if raw == HEARTBEAT_REPLY {
        trace!("Heartbeat reply received");
        return None;
    }

    match serde_json::from_str::<PushEvent>(raw) {
        Ok(PushEvent::Unknown) => {
            let tag = serde_json::from_str::<serde_json::Value>(raw)
                .ok()
                .and_then(|v| v.get("type").and_then(|t| t.as_str()).map(String::from))
                .unwrap_or_else(|| "<missing>".to_string());
            warn!("Ignoring unknown push event type: {tag}");
            None
        }
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Discarding undecodable frame ({} bytes): {e}", raw.len());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_reply_is_silent() {
        assert_eq!(decode_frame("pong"), None);
    }

    #[test]
    fn test_garbage_is_dropped() {
        assert_eq!(decode_frame("not json"), None);
        assert_eq!(decode_frame(""), None);
        assert_eq!(decode_frame("{\"no_type\":1}"), None);
    }

    /// Forward compatibility: a type this client has never heard of is
    /// ignored, not an error.
    #[test]
    fn test_unknown_type_is_ignored() {
        assert_eq!(
            decode_frame(r#"{"type":"call_transferred","call_id":"c1"}"#),
            None
        );
    }

    #[test]
    fn test_incoming_call_decodes() {
        let event = decode_frame(
            r#"{"type":"incoming_call","call_id":"c1","caller_name":"Alice","caller_id":"u1","room_name":"room-1"}"#,
        )
        .unwrap();
        match &event {
            PushEvent::IncomingCall {
                call_id,
                caller_name,
                ..
            } => {
                assert_eq!(call_id, &CallId::from("c1"));
                assert_eq!(caller_name, "Alice");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(event.kind(), "incoming_call");
    }

    #[test]
    fn test_extra_fields_tolerated() {
        let event = decode_frame(
            r#"{"type":"participant_joined","call_id":"c1","participant_name":"Bob","seq":7,"server_ts":123}"#,
        )
        .unwrap();
        let key = event.ledger_key().unwrap();
        assert_eq!(key.event_type, "participant_joined");
        assert_eq!(key.seq, Some(7));
    }

    /// `connection_established` has no call id and is never deduplicated.
    #[test]
    fn test_connection_established_has_no_ledger_key() {
        let event =
            decode_frame(r#"{"type":"connection_established","is_reconnect":true}"#).unwrap();
        assert_eq!(event.ledger_key(), None);
        match event {
            PushEvent::ConnectionEstablished { is_reconnect } => assert!(is_reconnect),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
