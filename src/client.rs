//! The signaling client: owns the push channel and drives everything else.
//!
//! One [`SignalClient`] per logged-in identity. `run` keeps the push channel
//! alive across abnormal closes with a linear-capped backoff, feeds inbound
//! frames to the [`CallManager`], and publishes connectivity changes on the
//! event bus. A deliberate `disconnect` sets the teardown flag first, so the
//! resulting close never triggers reconnection.

use crate::api::{ApiError, CallApi};
use crate::calls::CallManager;
use crate::config::ClientConfig;
use crate::media::{MediaTransport, SurfaceReadiness};
use crate::net::{HttpClient, UreqHttpClient};
use crate::transport::{Transport, TransportEvent, TransportFactory, WebSocketTransportFactory};
use crate::types::events::{ConnectionUpdate, EventBus, ReconnectExhausted};
use crate::types::{ConnectionState, ConnectionStatus, Role, SessionIdentity};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::time::sleep;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is already connecting or connected")]
    AlreadyConnected,
}

pub struct SignalClient {
    pub(crate) config: ClientConfig,
    identity: SessionIdentity,
    pub(crate) api: Arc<CallApi>,
    bus: Arc<EventBus>,
    calls: Arc<CallManager>,
    surfaces: Arc<SurfaceReadiness>,
    media: std::sync::Mutex<Option<Arc<dyn MediaTransport>>>,

    transport_factory: Arc<dyn TransportFactory>,
    pub(crate) transport: Mutex<Option<Arc<dyn Transport>>>,
    connection: std::sync::Mutex<ConnectionState>,

    is_running: AtomicBool,
    is_connecting: AtomicBool,
    /// Set by `disconnect` before the socket closes; the run loop reads it to
    /// tell a deliberate teardown from an abnormal close.
    intentional_teardown: AtomicBool,
    reconnect_attempts: AtomicU32,
    pub(crate) shutdown_notifier: Notify,
}

impl SignalClient {
    pub fn new(
        config: ClientConfig,
        identity: SessionIdentity,
        transport_factory: Arc<dyn TransportFactory>,
        api: Arc<CallApi>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let calls = Arc::new(CallManager::new(identity.clone(), api.clone(), bus.clone()));
        Arc::new(Self {
            config,
            identity,
            api,
            bus,
            calls,
            surfaces: Arc::new(SurfaceReadiness::new()),
            media: std::sync::Mutex::new(None),
            transport_factory,
            transport: Mutex::new(None),
            connection: std::sync::Mutex::new(ConnectionState::default()),
            is_running: AtomicBool::new(false),
            is_connecting: AtomicBool::new(false),
            intentional_teardown: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            shutdown_notifier: Notify::new(),
        })
    }

    /// Production wiring: ureq-backed REST client and a tokio-tungstenite
    /// push transport.
    pub fn with_defaults(config: ClientConfig, identity: SessionIdentity) -> Arc<Self> {
        let http: Arc<dyn HttpClient> = Arc::new(UreqHttpClient::new());
        let api = Arc::new(CallApi::new(http, config.api_base_url.clone()));
        let factory = Arc::new(WebSocketTransportFactory::new(config.push_base_url.clone()));
        Self::new(config, identity, factory, api)
    }

    /// Resolves `username` against the backend and builds a client for the
    /// resulting identity.
    pub async fn login(
        config: ClientConfig,
        username: &str,
        role: Role,
    ) -> Result<Arc<Self>, ApiError> {
        let http: Arc<dyn HttpClient> = Arc::new(UreqHttpClient::new());
        let api = Arc::new(CallApi::new(http, config.api_base_url.clone()));
        let record = api.resolve_user(username).await?;
        let identity = SessionIdentity {
            user_id: record.user_id,
            username: record.username,
            role,
        };
        info!("Logged in as {} ({})", identity.username, identity.user_id);
        let factory = Arc::new(WebSocketTransportFactory::new(config.push_base_url.clone()));
        Ok(Self::new(config, identity, factory, api))
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn calls(&self) -> &Arc<CallManager> {
        &self.calls
    }

    pub fn surfaces(&self) -> &Arc<SurfaceReadiness> {
        &self.surfaces
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().unwrap().status == ConnectionStatus::Connected
    }

    /// Attaches the media provider the call controls pass through to.
    pub fn attach_media_transport(&self, media: Arc<dyn MediaTransport>) {
        *self.media.lock().unwrap() = Some(media);
    }

    fn media_transport(&self) -> Option<Arc<dyn MediaTransport>> {
        self.media.lock().unwrap().clone()
    }

    pub async fn set_audio_enabled(&self, enabled: bool) -> Result<(), anyhow::Error> {
        match self.media_transport() {
            Some(media) => media.set_audio_enabled(enabled).await,
            None => {
                debug!("No media transport attached, audio toggle ignored");
                Ok(())
            }
        }
    }

    pub async fn set_video_enabled(&self, enabled: bool) -> Result<(), anyhow::Error> {
        match self.media_transport() {
            Some(media) => media.set_video_enabled(enabled).await,
            None => {
                debug!("No media transport attached, video toggle ignored");
                Ok(())
            }
        }
    }

    /// Keeps the push channel alive until `disconnect` or until the attempt
    /// cap is exhausted. After exhaustion the client stays down; a manual
    /// retry is another `run` call.
    pub async fn run(self: &Arc<Self>) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!("Client `run` called while already running.");
            return;
        }
        self.intentional_teardown.store(false, Ordering::Relaxed);

        while self.is_running.load(Ordering::Relaxed) {
            match self.connect_once().await {
                Ok(mut events) => {
                    self.reconnect_attempts.store(0, Ordering::Relaxed);
                    self.read_loop(&mut events).await;
                    self.cleanup_connection().await;
                }
                Err(e) => {
                    warn!("Connect failed: {e}");
                    self.connection.lock().unwrap().last_error = Some(e.to_string());
                    self.set_status(ConnectionStatus::Disconnected);
                }
            }

            if self.intentional_teardown.load(Ordering::Relaxed) {
                debug!("Intentional teardown, not reconnecting.");
                self.is_running.store(false, Ordering::Relaxed);
                break;
            }

            let attempt = self.reconnect_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt > self.config.max_reconnect_attempts {
                error!(
                    "Giving up after {} reconnect attempts; manual retry required.",
                    self.config.max_reconnect_attempts
                );
                let _ = self.bus.reconnect_exhausted.send(Arc::new(ReconnectExhausted {
                    attempts: self.config.max_reconnect_attempts,
                }));
                self.is_running.store(false, Ordering::Relaxed);
                break;
            }

            let delay = reconnect_delay(&self.config, attempt);
            info!(
                "Will attempt to reconnect in {:?} (attempt {}/{})",
                delay, attempt, self.config.max_reconnect_attempts
            );
            self.set_status(ConnectionStatus::Disconnected);
            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown_notifier.notified() => {}
            }
        }

        self.set_status(ConnectionStatus::Disconnected);
        info!("Client run loop has shut down.");
    }

    async fn connect_once(self: &Arc<Self>) -> Result<mpsc::Receiver<TransportEvent>, anyhow::Error> {
        if self.is_connecting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected.into());
        }
        let _guard = scopeguard::guard((), |_| {
            self.is_connecting.store(false, Ordering::Relaxed);
        });

        self.set_status(ConnectionStatus::Connecting);
        let (transport, events) = self.transport_factory.connect(&self.identity).await?;
        *self.transport.lock().await = Some(transport.clone());

        // The heartbeat is scoped to this epoch's transport; it exits on its
        // own once the stored transport is replaced or cleared.
        let client_clone = self.clone();
        tokio::spawn(async move { client_clone.heartbeat_loop(transport).await });

        Ok(events)
    }

    /// Consumes transport events until the connection ends, one way or the
    /// other. Only this loop and the heartbeat write to the socket.
    ///
    /// The shutdown future is armed before the connected status is published,
    /// so a `disconnect` racing the status update is never missed.
    async fn read_loop(self: &Arc<Self>, events: &mut mpsc::Receiver<TransportEvent>) {
        let shutdown = self.shutdown_notifier.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        // The teardown flag is stored before the notifier fires, so checking
        // it after arming the shutdown future catches a disconnect that
        // landed while the transport handshake was still in flight.
        if self.intentional_teardown.load(Ordering::Relaxed) {
            debug!("Teardown requested during connect, abandoning epoch.");
            return;
        }

        self.set_status(ConnectionStatus::Connected);
        info!("Push channel connected");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Shutdown signaled, leaving read loop.");
                    return;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Opened) => {
                        debug!("Transport reported open");
                    }
                    Some(TransportEvent::FrameReceived(raw)) => {
                        self.calls.handle_frame(&raw).await;
                    }
                    Some(TransportEvent::Closed { code, clean }) => {
                        if clean {
                            info!("Push channel closed (code: {code:?})");
                        } else {
                            warn!("Push channel lost (code: {code:?})");
                        }
                        return;
                    }
                    None => {
                        debug!("Transport event channel dropped, leaving read loop.");
                        return;
                    }
                }
            }
        }
    }

    /// Tears the channel down deliberately. Never triggers reconnection.
    pub async fn disconnect(&self) {
        info!("Disconnecting client intentionally.");
        self.intentional_teardown.store(true, Ordering::Relaxed);
        self.is_running.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();

        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Full logout. Fires the best-effort teardown notice when a hosted call
    /// is still current, then drops every piece of session state.
    pub async fn logout(&self) {
        if let Some(call_id) = self.calls.hosted_call_id().await {
            // Fire and forget; delivery is not a correctness mechanism.
            if let Err(e) = self.api.end_call(&call_id, &self.identity.username).await {
                debug!("Teardown notice for call {call_id} failed: {e}");
            }
        }
        if let Some(media) = self.media_transport() {
            if let Err(e) = media.disconnect().await {
                debug!("Media disconnect on logout failed: {e}");
            }
        }
        self.calls.reset().await;
        self.surfaces.clear();
        self.disconnect().await;
    }

    async fn cleanup_connection(&self) {
        // The transport may still be open here: either the epoch was
        // abandoned before the read loop started, or the close was abnormal
        // and only observed from the read side.
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn set_status(&self, status: ConnectionStatus) {
        let attempts = self.reconnect_attempts.load(Ordering::Relaxed);
        {
            let mut state = self.connection.lock().unwrap();
            state.status = status;
            state.reconnect_attempts = attempts;
            if status == ConnectionStatus::Connected {
                state.last_error = None;
            }
        }
        let _ = self.bus.connection.send(Arc::new(ConnectionUpdate {
            status,
            reconnect_attempts: attempts,
        }));
    }
}

/// Delay before reconnect attempt `attempt` (1-based): linear in the attempt
/// count, capped.
pub(crate) fn reconnect_delay(config: &ClientConfig, attempt: u32) -> Duration {
    let base = config.reconnect_base_delay.as_millis() as u64;
    let cap = config.reconnect_max_delay.as_millis() as u64;
    Duration::from_millis(base.saturating_mul(u64::from(attempt)).min(cap))
}
