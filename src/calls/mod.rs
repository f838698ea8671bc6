//! Call lifecycle: invites, the session state machine and the manager that
//! orchestrates both against push events and backend requests.

pub mod error;
pub mod invites;
pub mod manager;
pub mod state;

pub use error::CallError;
pub use invites::{IncomingInvite, InviteQueue};
pub use manager::CallManager;
pub use state::{CallPhase, CallSession, CallTransition, EndReason};
