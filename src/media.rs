//! Seam to the media provider that carries actual audio and video.
//!
//! The engine never touches media bytes. It hands the provider a token and a
//! room name, forwards mute/unmute/disconnect controls, and reacts to the
//! provider's lifecycle events (an unrecoverable disconnect ends the call
//! session). Track attachment readiness is an explicit per-participant
//! registry the rendering layer awaits on, instead of polling for a surface
//! on a retry timer.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Events the media provider reports back to the engine's glue layer.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    ParticipantConnected { user_id: String },
    ParticipantDisconnected { user_id: String },
    TrackSubscribed { user_id: String, kind: TrackKind },
    /// The media session dropped. `unrecoverable` means the provider will not
    /// re-establish it on its own and the call session must end.
    Disconnected { unrecoverable: bool },
}

/// Control surface of the media provider.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Joins the media room with credentials obtained from start/accept.
    async fn connect(&self, media_token: &str, room_name: &str) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    async fn set_audio_enabled(&self, enabled: bool) -> Result<()>;
    async fn set_video_enabled(&self, enabled: bool) -> Result<()>;
}

/// Per-participant rendering-surface readiness.
///
/// The rendering layer marks a participant's surface ready once it exists;
/// whoever needs to attach a track awaits that instead of retrying on a
/// timer. `wait_ready` resolves `false` when the participant leaves before
/// their surface ever appears, so no waiter is stranded.
#[derive(Default)]
pub struct SurfaceReadiness {
    surfaces: Mutex<HashMap<String, watch::Sender<bool>>>,
}

impl SurfaceReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    /// The surface for `user_id` exists and tracks may attach.
    pub fn mark_ready(&self, user_id: &str) {
        let mut surfaces = self.surfaces.lock().unwrap();
        surfaces
            .entry(user_id.to_string())
            .or_insert_with(|| watch::channel(false).0)
            .send_replace(true);
    }

    /// The participant left; pending waiters resolve unready.
    pub fn mark_gone(&self, user_id: &str) {
        self.surfaces.lock().unwrap().remove(user_id);
    }

    pub fn is_ready(&self, user_id: &str) -> bool {
        self.surfaces
            .lock()
            .unwrap()
            .get(user_id)
            .is_some_and(|tx| *tx.borrow())
    }

    /// Resolves `true` once the surface is ready, `false` if the participant
    /// is gone before that happens.
    pub async fn wait_ready(&self, user_id: &str) -> bool {
        let mut rx = {
            let mut surfaces = self.surfaces.lock().unwrap();
            surfaces
                .entry(user_id.to_string())
                .or_insert_with(|| watch::channel(false).0)
                .subscribe()
        };
        rx.wait_for(|ready| *ready).await.is_ok()
    }

    /// Drops every registration. Used on session teardown.
    pub fn clear(&self) {
        self.surfaces.lock().unwrap().clear();
    }
}
