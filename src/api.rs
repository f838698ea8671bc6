//! Typed consumer of the REST backend that owns call, user and participant
//! records. The backend is the source of truth; push notifications only hint
//! that something here is worth re-fetching.

use crate::net::{HttpClient, HttpRequest, HttpResponse};
use crate::types::{CallId, OnlineUser};
use log::debug;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] anyhow::Error),

    #[error("backend rejected request ({code}): {message}")]
    Rejected { code: u16, message: String },

    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// All backend payloads arrive wrapped in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Error payloads carry either `detail` or `message`.
#[derive(Debug, Deserialize, Default)]
struct ErrorBody {
    detail: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCallData {
    pub call_id: CallId,
    #[serde(alias = "provider_room_name")]
    pub room_name: String,
    #[serde(alias = "caller_token")]
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcceptCallData {
    /// Some backend versions omit this; the caller falls back to the room
    /// name carried by the invite.
    #[serde(default, alias = "provider_room_name")]
    pub room_name: Option<String>,
    #[serde(alias = "token")]
    pub access_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParticipantRecord {
    pub user_id: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct ParticipantsData {
    #[serde(default)]
    participants: Vec<ParticipantRecord>,
}

#[derive(Debug, Deserialize)]
struct OnlineUsersData {
    #[serde(default)]
    users: Vec<OnlineUser>,
}

/// Thin typed wrapper over the backend's call endpoints.
pub struct CallApi {
    http: Arc<dyn HttpClient>,
    base_url: String,
}

impl CallApi {
    pub fn new(http: Arc<dyn HttpClient>, base_url: impl Into<String>) -> Self {
        Self {
            http: http.clone(),
            base_url: base_url.into(),
        }
    }

    pub async fn resolve_user(&self, username: &str) -> Result<UserRecord> {
        self.get(&format!(
            "/calls/users/by-username/{}",
            urlencoding::encode(username)
        ))
        .await
    }

    pub async fn start_call(
        &self,
        caller_username: &str,
        participant_usernames: &[String],
        call_type: &str,
    ) -> Result<StartCallData> {
        self.post(
            "/calls/start-by-username",
            &serde_json::json!({
                "caller_username": caller_username,
                "participant_usernames": participant_usernames,
                "call_type": call_type,
            }),
        )
        .await
    }

    pub async fn accept_call(&self, call_id: &CallId, username: &str) -> Result<AcceptCallData> {
        self.post(
            &format!("/calls/{call_id}/accept-by-username"),
            &serde_json::json!({ "username": username }),
        )
        .await
    }

    pub async fn decline_call(&self, call_id: &CallId, username: &str) -> Result<()> {
        self.post_no_data(
            &format!("/calls/{call_id}/decline-by-username"),
            &serde_json::json!({ "username": username }),
        )
        .await
    }

    pub async fn add_participant(
        &self,
        call_id: &CallId,
        caller_username: &str,
        new_participant_username: &str,
    ) -> Result<()> {
        self.post_no_data(
            &format!("/calls/{call_id}/add-participant-by-username"),
            &serde_json::json!({
                "caller_username": caller_username,
                "new_participant_username": new_participant_username,
            }),
        )
        .await
    }

    pub async fn list_participants(&self, call_id: &CallId) -> Result<Vec<ParticipantRecord>> {
        let data: ParticipantsData = self.get(&format!("/calls/{call_id}/participants")).await?;
        Ok(data.participants)
    }

    /// Terminates the call for every participant. Host only; the backend
    /// enforces the role.
    pub async fn end_call(&self, call_id: &CallId, host_username: &str) -> Result<()> {
        self.post_no_data(
            &format!("/calls/{call_id}/end-by-username"),
            &serde_json::json!({ "host_username": host_username }),
        )
        .await
    }

    /// Removes only the calling user; the call stays active for the others.
    pub async fn leave_call(&self, call_id: &CallId, username: &str) -> Result<()> {
        self.post_no_data(
            &format!("/calls/{call_id}/leave-by-username"),
            &serde_json::json!({ "username": username }),
        )
        .await
    }

    pub async fn list_online_users(&self) -> Result<Vec<OnlineUser>> {
        let data: OnlineUsersData = self.get("/ws/online-users").await?;
        Ok(data.users)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = HttpRequest::get(format!("{}{path}", self.base_url));
        let response = self.http.execute(request).await?;
        Self::decode(path, response)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let request = HttpRequest::post(format!("{}{path}", self.base_url))
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(body)?);
        let response = self.http.execute(request).await?;
        Self::decode(path, response)
    }

    async fn post_no_data(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        let request = HttpRequest::post(format!("{}{path}", self.base_url))
            .with_header("Content-Type", "application/json")
            .with_body(serde_json::to_vec(body)?);
        let response = self.http.execute(request).await?;
        if !response.is_success() {
            return Err(Self::rejection(path, &response));
        }
        Ok(())
    }

    fn decode<T: DeserializeOwned>(path: &str, response: HttpResponse) -> Result<T> {
        if !response.is_success() {
            return Err(Self::rejection(path, &response));
        }
        let envelope: Envelope<T> = serde_json::from_slice(&response.body)?;
        Ok(envelope.data)
    }

    fn rejection(path: &str, response: &HttpResponse) -> ApiError {
        let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
        let message = body
            .detail
            .or(body.message)
            .unwrap_or_else(|| "request failed".to_string());
        debug!("Backend rejected {path}: {} {message}", response.status_code);
        ApiError::Rejected {
            code: response.status_code,
            message,
        }
    }
}
