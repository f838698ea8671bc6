//! Call session state machine.

use crate::types::{CallId, ParticipantRef};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// The local host ended the call for everyone.
    LocalEnded,
    /// The local participant left; the call continues for the others.
    LocalLeft,
    /// The host ended the call remotely.
    RemoteEnded,
    /// The media transport dropped with an unrecoverable error.
    MediaFailure,
}

/// Phase of the current session. Idle is the absence of a session
/// (`Option<CallSession>` is `None`), not a phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CallPhase {
    /// Outgoing call: backend accepted the start request, nobody has
    /// answered yet.
    RingingOut { started_at: DateTime<Utc> },
    /// Call confirmed with at least one remote participant, media flowing.
    Active { connected_at: DateTime<Utc> },
    /// Terminal. Observable for exactly one notification cycle before the
    /// session resets to idle; never a resting state.
    Ended {
        reason: EndReason,
        ended_at: DateTime<Utc>,
    },
}

impl CallPhase {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }
}

/// State transitions for a session.
#[derive(Debug, Clone)]
pub enum CallTransition {
    /// An authoritative roster fetch confirmed a remote participant.
    RosterConfirmed,
    Terminated { reason: EndReason },
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_phase: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in phase {}",
            self.attempted, self.current_phase
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// The one current call of a logged-in identity.
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub call_id: CallId,
    pub room_name: String,
    pub host_user_id: String,
    pub phase: CallPhase,
    /// Authoritative membership. Seeded with the local user; replaced
    /// wholesale by every reconciliation fetch.
    pub roster: Vec<ParticipantRef>,
    pub recording: bool,
}

impl CallSession {
    /// Session for a call the local user just started. Rings out with a
    /// self-only roster until a fetch confirms someone answered.
    pub fn new_outgoing(call_id: CallId, room_name: String, local: ParticipantRef) -> Self {
        Self {
            call_id,
            room_name,
            host_user_id: local.user_id.clone(),
            phase: CallPhase::RingingOut {
                started_at: Utc::now(),
            },
            roster: vec![local],
            recording: false,
        }
    }

    /// Session for an accepted invite. The accept request is synchronous, so
    /// there is no ringing-in gap: the session is active immediately.
    pub fn new_accepted(
        call_id: CallId,
        room_name: String,
        host_user_id: String,
        local: ParticipantRef,
    ) -> Self {
        Self {
            call_id,
            room_name,
            host_user_id,
            phase: CallPhase::Active {
                connected_at: Utc::now(),
            },
            roster: vec![local],
            recording: false,
        }
    }

    pub fn is_current(&self, call_id: &CallId) -> bool {
        &self.call_id == call_id
    }

    pub fn has_remote_member(&self, local_user_id: &str) -> bool {
        self.roster.iter().any(|p| p.user_id != local_user_id)
    }

    /// Apply a state transition. Returns an error if the transition is not
    /// valid from the current phase.
    pub fn apply_transition(
        &mut self,
        transition: CallTransition,
    ) -> Result<(), InvalidTransition> {
        let new_phase = match (&self.phase, &transition) {
            (CallPhase::RingingOut { .. }, CallTransition::RosterConfirmed) => CallPhase::Active {
                connected_at: Utc::now(),
            },
            // Confirmation while already active is a natural consequence of
            // repeated reconciliations.
            (CallPhase::Active { connected_at }, CallTransition::RosterConfirmed) => {
                CallPhase::Active {
                    connected_at: *connected_at,
                }
            }
            (
                CallPhase::RingingOut { .. } | CallPhase::Active { .. },
                CallTransition::Terminated { reason },
            ) => CallPhase::Ended {
                reason: *reason,
                ended_at: Utc::now(),
            },
            (current, attempted) => {
                return Err(InvalidTransition {
                    current_phase: format!("{current:?}"),
                    attempted: format!("{attempted:?}"),
                });
            }
        };
        self.phase = new_phase;
        Ok(())
    }

    /// Replaces the roster wholesale with a fetched membership set.
    ///
    /// The local user is never dropped by reconciliation; only an explicit
    /// ended/left transition removes them. `joined_at` stamps of members
    /// already present are preserved across replacements.
    pub fn replace_roster(&mut self, local: &ParticipantRef, mut fetched: Vec<ParticipantRef>) {
        for member in &mut fetched {
            if let Some(existing) = self.roster.iter().find(|p| p.user_id == member.user_id) {
                member.joined_at = existing.joined_at;
            }
        }
        if !fetched.iter().any(|p| p.user_id == local.user_id) {
            let restored = self
                .roster
                .iter()
                .find(|p| p.user_id == local.user_id)
                .cloned()
                .unwrap_or_else(|| local.clone());
            fetched.insert(0, restored);
        }
        self.roster = fetched;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local() -> ParticipantRef {
        ParticipantRef {
            user_id: "u-host".to_string(),
            display_name: "Alice".to_string(),
            joined_at: Utc::now(),
        }
    }

    fn remote(user_id: &str, name: &str) -> ParticipantRef {
        ParticipantRef {
            user_id: user_id.to_string(),
            display_name: name.to_string(),
            joined_at: Utc::now(),
        }
    }

    fn make_outgoing() -> CallSession {
        CallSession::new_outgoing(CallId::from("c1"), "room-1".to_string(), local())
    }

    /// Flow: RingingOut → Active → Ended.
    #[test]
    fn test_outgoing_flow() {
        let mut session = make_outgoing();
        assert!(matches!(session.phase, CallPhase::RingingOut { .. }));
        assert_eq!(session.roster.len(), 1);

        session
            .apply_transition(CallTransition::RosterConfirmed)
            .unwrap();
        assert!(session.phase.is_active());

        session
            .apply_transition(CallTransition::Terminated {
                reason: EndReason::LocalEnded,
            })
            .unwrap();
        assert!(session.phase.is_ended());
    }

    /// Accepted invites skip ringing entirely.
    #[test]
    fn test_accepted_session_starts_active() {
        let session = CallSession::new_accepted(
            CallId::from("c1"),
            "room-1".to_string(),
            "u-host".to_string(),
            remote("u-bob", "Bob"),
        );
        assert!(session.phase.is_active());
    }

    /// Ended sessions reject every further transition.
    #[test]
    fn test_ended_rejects_transitions() {
        let mut session = make_outgoing();
        session
            .apply_transition(CallTransition::Terminated {
                reason: EndReason::RemoteEnded,
            })
            .unwrap();

        assert!(
            session
                .apply_transition(CallTransition::RosterConfirmed)
                .is_err()
        );
        assert!(
            session
                .apply_transition(CallTransition::Terminated {
                    reason: EndReason::LocalEnded,
                })
                .is_err()
        );
    }

    /// Re-confirmation while active keeps the original connect time.
    #[test]
    fn test_repeat_confirmation_is_stable() {
        let mut session = make_outgoing();
        session
            .apply_transition(CallTransition::RosterConfirmed)
            .unwrap();
        let first = session.phase.clone();
        session
            .apply_transition(CallTransition::RosterConfirmed)
            .unwrap();
        assert_eq!(session.phase, first);
    }

    /// Reconciliation never removes the local user from their own roster.
    #[test]
    fn test_replace_roster_preserves_local_user() {
        let mut session = make_outgoing();
        let me = local();
        session.replace_roster(&me, vec![remote("u-bob", "Bob")]);

        assert_eq!(session.roster.len(), 2);
        assert!(session.roster.iter().any(|p| p.user_id == "u-host"));
        assert!(session.has_remote_member("u-host"));
    }

    /// joined_at stamps survive wholesale replacement.
    #[test]
    fn test_replace_roster_keeps_join_stamps() {
        let mut session = make_outgoing();
        let me = local();
        let bob = remote("u-bob", "Bob");
        session.replace_roster(&me, vec![me.clone(), bob.clone()]);
        let first_seen = session
            .roster
            .iter()
            .find(|p| p.user_id == "u-bob")
            .unwrap()
            .joined_at;

        let mut later_bob = bob.clone();
        later_bob.joined_at = Utc::now() + chrono::Duration::seconds(60);
        session.replace_roster(&me, vec![me.clone(), later_bob]);

        let kept = session
            .roster
            .iter()
            .find(|p| p.user_id == "u-bob")
            .unwrap()
            .joined_at;
        assert_eq!(kept, first_seen);
    }
}
