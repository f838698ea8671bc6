use crate::calls::invites::IncomingInvite;
use crate::calls::state::{CallPhase, EndReason};
use crate::types::{CallId, ConnectionStatus, OnlineUser, ParticipantRef};
use std::sync::Arc;
use tokio::sync::broadcast;

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// Push-channel connectivity changed.
#[derive(Debug, Clone)]
pub struct ConnectionUpdate {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
}

/// The reconnect policy gave up after the attempt cap. The UI should offer a
/// manual retry; the engine will not reconnect on its own.
#[derive(Debug, Clone)]
pub struct ReconnectExhausted {
    pub attempts: u32,
}

/// A pending invite was removed without local action: the caller cancelled,
/// the call ended before the user answered, or it was declined elsewhere.
#[derive(Debug, Clone)]
pub struct InviteEvicted {
    pub call_id: CallId,
}

/// The current session changed phase.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub call_id: CallId,
    pub phase: CallPhase,
}

/// The roster was replaced by an authoritative fetch.
#[derive(Debug, Clone)]
pub struct RosterUpdated {
    pub call_id: CallId,
    pub roster: Vec<ParticipantRef>,
}

/// The current call was terminated remotely. User-visible: the host ended the
/// call for everyone.
#[derive(Debug, Clone)]
pub struct CallEndedRemotely {
    pub call_id: CallId,
    pub reason: EndReason,
}

/// Recording started on the current call.
#[derive(Debug, Clone)]
pub struct RecordingStarted {
    pub call_id: CallId,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        /// The rendering layer subscribes to the channels it cares about;
        /// nothing in the engine ever blocks on a slow or absent subscriber.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    // Connection events
    (connection, Arc<ConnectionUpdate>),
    (reconnect_exhausted, Arc<ReconnectExhausted>),

    // Invite events
    (invite_received, Arc<IncomingInvite>),
    (invite_evicted, Arc<InviteEvicted>),

    // Session events
    (session_update, Arc<SessionUpdate>),
    (roster_updated, Arc<RosterUpdated>),
    (call_ended_remotely, Arc<CallEndedRemotely>),
    (recording_started, Arc<RecordingStarted>),

    // Dashboard events
    (online_users, Arc<Vec<OnlineUser>>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
