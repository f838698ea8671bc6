//! Orchestrates the call lifecycle for one logged-in identity.
//!
//! All session mutation funnels through one mutex-guarded state, so push
//! dispatch and local user actions are serialized even on a multi-threaded
//! runtime. Push events are treated as hints: anything that implies a roster
//! change triggers an authoritative `list-participants` fetch, and the fetch
//! result replaces the roster wholesale. Local actions (start, accept,
//! decline, end) hold a separate action lock across their backend call;
//! events arriving mid-request are applied as soon as the state lock frees,
//! and the post-action reconciliation fetch settles any roster race.

use super::error::CallError;
use super::invites::{IncomingInvite, InviteQueue};
use super::state::{CallPhase, CallSession, CallTransition, EndReason};
use crate::api::CallApi;
use crate::dispatch::{PushEvent, decode_frame};
use crate::ledger::{IdempotencyLedger, LedgerConfig};
use crate::types::events::{
    CallEndedRemotely, EventBus, InviteEvicted, RosterUpdated, SessionUpdate,
};
use crate::types::{CallId, MediaCredentials, ParticipantRef, SessionIdentity};
use chrono::Utc;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
struct SessionState {
    session: Option<CallSession>,
    invites: InviteQueue,
    ledger: IdempotencyLedger,
}

pub struct CallManager {
    identity: SessionIdentity,
    api: Arc<CallApi>,
    bus: Arc<EventBus>,
    state: Mutex<SessionState>,
    /// Serializes local user actions; push dispatch is not blocked by it.
    actions: Mutex<()>,
}

impl CallManager {
    pub fn new(identity: SessionIdentity, api: Arc<CallApi>, bus: Arc<EventBus>) -> Self {
        Self {
            identity,
            api,
            bus,
            state: Mutex::new(SessionState {
                ledger: IdempotencyLedger::new(LedgerConfig::default()),
                ..Default::default()
            }),
            actions: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    /// Snapshot of the current session, if any.
    pub async fn current_session(&self) -> Option<CallSession> {
        self.state.lock().await.session.clone()
    }

    /// Snapshot of the pending invite queue, arrival order.
    pub async fn pending_invites(&self) -> Vec<IncomingInvite> {
        self.state.lock().await.invites.iter().cloned().collect()
    }

    /// The call id to notify the backend about during best-effort teardown:
    /// only a hosted, still-current call qualifies.
    pub async fn hosted_call_id(&self) -> Option<CallId> {
        let st = self.state.lock().await;
        let session = st.session.as_ref()?;
        (self.identity.is_host() && session.host_user_id == self.identity.user_id)
            .then(|| session.call_id.clone())
    }

    /// Entry point for raw push-channel frames.
    pub async fn handle_frame(&self, raw: &str) {
        if let Some(event) = decode_frame(raw) {
            self.apply_push(event).await;
        }
    }

    /// Routes one decoded push event. Duplicates recorded in the idempotency
    /// ledger are dropped before they can re-trigger anything.
    pub async fn apply_push(&self, event: PushEvent) {
        let mut reconcile_target: Option<CallId> = None;

        {
            let mut st = self.state.lock().await;

            if let Some(key) = event.ledger_key() {
                if !st.ledger.observe(key) {
                    debug!(
                        target: "Client/Dispatch",
                        "Dropping duplicate {} for call {}",
                        event.kind(),
                        event.call_id().map(CallId::as_str).unwrap_or("?")
                    );
                    return;
                }
            }

            match event {
                PushEvent::ConnectionEstablished { is_reconnect } => {
                    debug!(
                        target: "Client/Dispatch",
                        "Push channel acknowledged ({})",
                        if is_reconnect { "reconnect" } else { "new" }
                    );
                }
                PushEvent::IncomingCall {
                    call_id,
                    caller_name,
                    caller_id,
                    room_name,
                    ..
                } => {
                    let holds_current = st
                        .session
                        .as_ref()
                        .is_some_and(|s| s.is_current(&call_id));
                    if holds_current || st.invites.contains(&call_id) {
                        debug!(
                            target: "Client/Dispatch",
                            "Ignoring incoming_call for already-known call {call_id}"
                        );
                    } else {
                        let invite = IncomingInvite {
                            call_id,
                            caller_name,
                            caller_id,
                            room_name,
                            received_at: Utc::now(),
                        };
                        info!(
                            target: "Client/Calls",
                            "Incoming call {} from {}",
                            invite.call_id, invite.caller_name
                        );
                        st.invites.enqueue(invite.clone());
                        let _ = self.bus.invite_received.send(Arc::new(invite));
                    }
                }
                PushEvent::CallAccepted { call_id, .. } => {
                    let is_our_outgoing = st.session.as_ref().is_some_and(|s| {
                        s.is_current(&call_id) && s.host_user_id == self.identity.user_id
                    });
                    if is_our_outgoing {
                        reconcile_target = Some(call_id);
                    } else {
                        debug!(
                            target: "Client/Dispatch",
                            "Ignoring call_accepted for non-current call {call_id}"
                        );
                    }
                }
                PushEvent::ParticipantJoined { call_id, .. }
                | PushEvent::ParticipantLeft { call_id, .. } => {
                    if st.session.as_ref().is_some_and(|s| s.is_current(&call_id)) {
                        reconcile_target = Some(call_id);
                    } else {
                        debug!(
                            target: "Client/Dispatch",
                            "Ignoring participant event for non-current call {call_id}"
                        );
                    }
                }
                PushEvent::CallEnded { call_id, .. } => {
                    if st.invites.evict(&call_id) {
                        info!(
                            target: "Client/Calls",
                            "Evicting stale invite for ended call {call_id}"
                        );
                        let _ = self.bus.invite_evicted.send(Arc::new(InviteEvicted {
                            call_id: call_id.clone(),
                        }));
                    }
                    if st.session.as_ref().is_some_and(|s| s.is_current(&call_id)) {
                        info!(target: "Client/Calls", "Call {call_id} ended by host");
                        self.finish_session(&mut st, EndReason::RemoteEnded);
                        let _ = self.bus.call_ended_remotely.send(Arc::new(CallEndedRemotely {
                            call_id,
                            reason: EndReason::RemoteEnded,
                        }));
                    } else {
                        debug!(
                            target: "Client/Dispatch",
                            "Ignoring call_ended for non-current call {call_id}"
                        );
                    }
                }
                PushEvent::RecordingStarted { call_id, .. } => {
                    if let Some(session) = st
                        .session
                        .as_mut()
                        .filter(|s| s.is_current(&call_id))
                    {
                        session.recording = true;
                        let _ = self
                            .bus
                            .recording_started
                            .send(Arc::new(crate::types::events::RecordingStarted { call_id }));
                    }
                }
                PushEvent::Unknown => {}
            }
        }

        if let Some(call_id) = reconcile_target {
            self.reconcile(&call_id).await;
        }
    }

    /// Starts an outgoing call. Rejected locally, without a backend request,
    /// while any session exists.
    pub async fn start_call(
        &self,
        participant_usernames: &[String],
        call_type: &str,
    ) -> Result<MediaCredentials, CallError> {
        let _action = self.actions.lock().await;

        if let Some(session) = &self.state.lock().await.session {
            return Err(CallError::CallInProgress(session.call_id.clone()));
        }

        let data = self
            .api
            .start_call(&self.identity.username, participant_usernames, call_type)
            .await?;

        {
            let mut st = self.state.lock().await;
            let mut session = CallSession::new_outgoing(
                data.call_id.clone(),
                data.room_name.clone(),
                self.local_participant(),
            );
            // Hosted consultations are recorded from the start.
            session.recording = true;
            let _ = self.bus.session_update.send(Arc::new(SessionUpdate {
                call_id: session.call_id.clone(),
                phase: session.phase.clone(),
            }));
            st.session = Some(session);
        }

        // First authoritative fetch; a failure is tolerated and retried on
        // the next signal.
        self.reconcile(&data.call_id).await;

        Ok(MediaCredentials {
            call_id: data.call_id,
            room_name: data.room_name,
            media_token: data.access_token,
        })
    }

    /// Accepts a queued invite. On backend failure the invite stays queued.
    pub async fn accept_invite(&self, call_id: &CallId) -> Result<MediaCredentials, CallError> {
        let _action = self.actions.lock().await;

        {
            let st = self.state.lock().await;
            if let Some(session) = &st.session {
                return Err(CallError::CallInProgress(session.call_id.clone()));
            }
            if !st.invites.contains(call_id) {
                return Err(CallError::UnknownInvite(call_id.clone()));
            }
        }

        let data = self.api.accept_call(call_id, &self.identity.username).await?;

        let credentials = {
            let mut st = self.state.lock().await;
            // The invite can disappear mid-accept if the call ended during the
            // request; the session must not be resurrected in that case.
            let invite = st
                .invites
                .remove(call_id)
                .ok_or_else(|| CallError::UnknownInvite(call_id.clone()))?;
            let room_name = data.room_name.unwrap_or(invite.room_name);
            let session = CallSession::new_accepted(
                call_id.clone(),
                room_name.clone(),
                invite.caller_id,
                self.local_participant(),
            );
            let _ = self.bus.session_update.send(Arc::new(SessionUpdate {
                call_id: session.call_id.clone(),
                phase: session.phase.clone(),
            }));
            st.session = Some(session);
            MediaCredentials {
                call_id: call_id.clone(),
                room_name,
                media_token: data.access_token,
            }
        };

        self.reconcile(call_id).await;

        Ok(credentials)
    }

    /// Declines a queued invite. Other invites stay queued and actionable.
    pub async fn decline_invite(&self, call_id: &CallId) -> Result<(), CallError> {
        let _action = self.actions.lock().await;

        if !self.state.lock().await.invites.contains(call_id) {
            return Err(CallError::UnknownInvite(call_id.clone()));
        }

        self.api
            .decline_call(call_id, &self.identity.username)
            .await?;

        let _ = self.state.lock().await.invites.remove(call_id);
        Ok(())
    }

    /// Ends the current call, role-aware: a host terminates the call for
    /// everyone, a participant only removes themselves. The backend enforces
    /// the asymmetry; the client merely picks the request.
    pub async fn end_call(&self) -> Result<(), CallError> {
        let _action = self.actions.lock().await;

        let call_id = {
            let st = self.state.lock().await;
            st.session
                .as_ref()
                .map(|s| s.call_id.clone())
                .ok_or(CallError::NoCurrentCall)?
        };

        let reason = if self.identity.is_host() {
            self.api.end_call(&call_id, &self.identity.username).await?;
            EndReason::LocalEnded
        } else {
            self.api
                .leave_call(&call_id, &self.identity.username)
                .await?;
            EndReason::LocalLeft
        };

        let mut st = self.state.lock().await;
        if st.session.as_ref().is_some_and(|s| s.is_current(&call_id)) {
            self.finish_session(&mut st, reason);
        }
        Ok(())
    }

    /// Invites another user into the current call.
    pub async fn add_participant(&self, new_username: &str) -> Result<(), CallError> {
        let call_id = {
            let st = self.state.lock().await;
            st.session
                .as_ref()
                .map(|s| s.call_id.clone())
                .ok_or(CallError::NoCurrentCall)?
        };
        self.api
            .add_participant(&call_id, &self.identity.username, new_username)
            .await?;
        Ok(())
    }

    /// Hook for the media glue layer: the media transport dropped. An
    /// unrecoverable drop tears the session down; a recoverable one is the
    /// transport's own problem.
    pub async fn media_disconnected(&self, unrecoverable: bool) {
        if !unrecoverable {
            return;
        }
        let mut st = self.state.lock().await;
        if st.session.is_some() {
            warn!(target: "Client/Calls", "Media transport failed, tearing down session");
            self.finish_session(&mut st, EndReason::MediaFailure);
        }
    }

    /// Fetches authoritative membership and replaces the roster wholesale.
    /// A result arriving for a call that is no longer current is discarded.
    pub async fn reconcile(&self, call_id: &CallId) {
        let fetched = match self.api.list_participants(call_id).await {
            Ok(list) => list,
            Err(e) => {
                warn!(
                    target: "Client/Roster",
                    "Roster fetch for call {call_id} failed, will retry on next signal: {e}"
                );
                return;
            }
        };

        let mut st = self.state.lock().await;
        let Some(session) = st.session.as_mut().filter(|s| s.is_current(call_id)) else {
            debug!(
                target: "Client/Roster",
                "Discarding roster for stale call {call_id}"
            );
            return;
        };

        let now = Utc::now();
        let members = fetched
            .into_iter()
            .map(|r| ParticipantRef {
                user_id: r.user_id,
                display_name: r.display_name,
                joined_at: now,
            })
            .collect();
        session.replace_roster(&self.local_participant(), members);

        if !session.phase.is_active() && session.has_remote_member(&self.identity.user_id) {
            if session
                .apply_transition(CallTransition::RosterConfirmed)
                .is_ok()
            {
                info!(
                    target: "Client/Calls",
                    "Call {call_id} answered, session active"
                );
                let _ = self.bus.session_update.send(Arc::new(SessionUpdate {
                    call_id: call_id.clone(),
                    phase: session.phase.clone(),
                }));
            }
        }

        let _ = self.bus.roster_updated.send(Arc::new(RosterUpdated {
            call_id: call_id.clone(),
            roster: session.roster.clone(),
        }));
    }

    /// Logout/teardown: no session, invite or ledger state survives into the
    /// next login.
    pub async fn reset(&self) {
        let mut st = self.state.lock().await;
        st.session = None;
        st.invites.clear();
        st.ledger.clear();
    }

    fn local_participant(&self) -> ParticipantRef {
        ParticipantRef {
            user_id: self.identity.user_id.clone(),
            display_name: self.identity.username.clone(),
            joined_at: Utc::now(),
        }
    }

    /// Ended is observable for exactly one notification cycle: the update is
    /// published with the terminal phase, then the session resets to idle
    /// before anything else is processed.
    fn finish_session(&self, st: &mut SessionState, reason: EndReason) {
        let Some(mut session) = st.session.take() else {
            return;
        };
        if let Err(e) = session.apply_transition(CallTransition::Terminated { reason }) {
            debug!(target: "Client/Calls", "Terminating already-ended session: {e}");
            session.phase = CallPhase::Ended {
                reason,
                ended_at: Utc::now(),
            };
        }
        let _ = self.bus.session_update.send(Arc::new(SessionUpdate {
            call_id: session.call_id.clone(),
            phase: session.phase.clone(),
        }));
    }
}
