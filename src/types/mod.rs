pub mod events;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier of a call, assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Role chosen at login. Only a host may terminate a call for everyone;
/// a participant leaving removes only themselves. The backend enforces the
/// asymmetry; the client uses the role to pick which request to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Participant,
}

/// Who is logged in. Created at login, immutable until logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl SessionIdentity {
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Push-channel status, mutated only by the connection run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Consecutive failed reconnects. Reset to zero on a successful connect,
    /// incremented only on abnormal close.
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
}

/// One member of a call roster. Always produced by the authoritative
/// participant fetch, never from push-message fields alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub user_id: String,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
}

/// A user currently reachable on the push channel, as reported by the
/// online-users poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OnlineUser {
    pub user_id: String,
    pub username: String,
}

/// What the UI needs to hand to the media transport after a successful
/// start or accept.
#[derive(Debug, Clone)]
pub struct MediaCredentials {
    pub call_id: CallId,
    pub room_name: String,
    pub media_token: String,
}
