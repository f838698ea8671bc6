//! Call-related error types.

use crate::api::ApiError;
use crate::types::CallId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallError {
    /// A start or accept was attempted while a session already exists. The
    /// action is rejected locally; no backend request is issued.
    #[error("a call is already in progress: {0}")]
    CallInProgress(CallId),

    #[error("no call is currently in progress")]
    NoCurrentCall,

    #[error("no pending invite for call: {0}")]
    UnknownInvite(CallId),

    #[error("backend request failed: {0}")]
    Api(#[from] ApiError),
}
