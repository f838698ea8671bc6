//! ringline: a call-signaling client engine.
//!
//! Keeps one logged-in user's view of real-time call sessions consistent
//! across an unreliable push channel and an authoritative REST backend.
//! Push notifications are treated as hints; any roster-affecting signal
//! triggers a pull from the source of truth. The UI drives the engine
//! through [`client::SignalClient`] and observes it on the typed event bus.

pub mod api;
pub mod calls;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod keepalive;
pub mod ledger;
pub mod media;
pub mod net;
pub mod presence;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::{ApiError, CallApi};
pub use calls::{CallError, CallManager, CallPhase, CallSession, EndReason, IncomingInvite};
pub use client::SignalClient;
pub use config::ClientConfig;
pub use media::{MediaEvent, MediaTransport, SurfaceReadiness, TrackKind};
pub use types::{
    CallId, ConnectionState, ConnectionStatus, MediaCredentials, OnlineUser, ParticipantRef, Role,
    SessionIdentity,
};
