//! Push-channel transport seam.
//!
//! The transport is a dumb pipe for text frames with no knowledge of the
//! signaling protocol. The connection run loop in [`crate::client`] is the
//! only writer; everything else observes [`TransportEvent`]s.

use crate::types::SessionIdentity;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace, warn};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// An event produced by the transport layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport has successfully connected.
    Opened,
    /// A text frame has been received from the server.
    FrameReceived(String),
    /// The connection was lost. `clean` means the server sent a close frame.
    /// The flag is informational only; whether to reconnect is decided by
    /// the client's own teardown flag, never by the close event.
    Closed { code: Option<u16>, clean: bool },
}

/// Represents an active push-channel connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a text frame to the server.
    async fn send(&self, frame: &str) -> Result<(), anyhow::Error>;

    /// Closes the connection.
    async fn close(&self);
}

/// A factory responsible for creating new transport instances, one per
/// connection epoch.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Opens a transport for the given identity and returns it, along with a
    /// stream of events.
    async fn connect(
        &self,
        identity: &SessionIdentity,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error>;
}

type RawWs = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<RawWs, Message>;
type WsStream = SplitStream<RawWs>;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// WebSocket transport backed by tokio-tungstenite.
pub struct WebSocketTransport {
    ws_sink: Arc<Mutex<Option<WsSink>>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&self, frame: &str) -> Result<(), anyhow::Error> {
        let mut sink_guard = self.ws_sink.lock().await;
        let sink = sink_guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("socket is closed"))?;
        trace!("--> Sending frame: {} bytes", frame.len());
        sink.send(Message::text(frame.to_string()))
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket send error: {e}"))?;
        Ok(())
    }

    async fn close(&self) {
        let mut sink_guard = self.ws_sink.lock().await;
        if let Some(mut sink) = sink_guard.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!("Close frame send failed (already gone): {e}");
            }
        }
    }
}

/// Factory that dials the notification endpoint for a given identity.
pub struct WebSocketTransportFactory {
    push_base_url: String,
}

impl WebSocketTransportFactory {
    pub fn new(push_base_url: impl Into<String>) -> Self {
        Self {
            push_base_url: push_base_url.into(),
        }
    }

    fn notification_url(&self, identity: &SessionIdentity) -> String {
        format!(
            "{}/ws/call-notifications/{}?username={}",
            self.push_base_url,
            identity.user_id,
            urlencoding::encode(&identity.username)
        )
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn connect(
        &self,
        identity: &SessionIdentity,
    ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
        let url = self.notification_url(identity);
        info!("Dialing {url}");

        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| anyhow::anyhow!("WebSocket connect failed: {e}"))?;

        let (sink, stream) = ws.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let transport = Arc::new(WebSocketTransport {
            ws_sink: Arc::new(Mutex::new(Some(sink))),
        });

        tokio::task::spawn(read_pump(stream, event_tx.clone()));

        let _ = event_tx.send(TransportEvent::Opened).await;

        Ok((transport, event_rx))
    }
}

async fn read_pump(mut stream: WsStream, event_tx: mpsc::Sender<TransportEvent>) {
    let mut close_code: Option<u16> = None;
    let mut clean = false;

    loop {
        match stream.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(txt) => {
                    trace!("<-- Received frame: {} bytes", txt.len());
                    if event_tx
                        .send(TransportEvent::FrameReceived(txt.as_str().to_owned()))
                        .await
                        .is_err()
                    {
                        warn!("Event receiver dropped, closing read pump");
                        return;
                    }
                }
                Message::Close(frame) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    clean = true;
                    trace!("Received close frame (code: {close_code:?})");
                    break;
                }
                // Protocol-level ping/pong is handled by tungstenite itself;
                // binary frames are not part of this protocol.
                other => {
                    debug!("Ignoring non-text WebSocket message: {other:?}");
                }
            },
            Some(Err(e)) => {
                error!("Error reading from websocket: {e}");
                break;
            }
            None => {
                trace!("Websocket stream ended");
                break;
            }
        }
    }

    let _ = event_tx
        .send(TransportEvent::Closed {
            code: close_code,
            clean,
        })
        .await;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A transport that records sent frames, for testing purposes.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<String>>,
        pub close_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, frame: &str) -> Result<(), anyhow::Error> {
            self.sent.lock().await.push(frame.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// A factory handing out scripted event streams. Each `connect` call
    /// consumes the next prepared receiver, so a test can model several
    /// connection epochs.
    pub struct MockTransportFactory {
        transport: Arc<MockTransport>,
        epochs: Mutex<Vec<mpsc::Receiver<TransportEvent>>>,
        pub connect_calls: AtomicUsize,
    }

    impl MockTransportFactory {
        pub fn new(epochs: Vec<mpsc::Receiver<TransportEvent>>) -> Self {
            Self {
                transport: Arc::new(MockTransport::default()),
                epochs: Mutex::new(epochs),
                connect_calls: AtomicUsize::new(0),
            }
        }

        pub fn transport(&self) -> Arc<MockTransport> {
            self.transport.clone()
        }
    }

    #[async_trait]
    impl TransportFactory for MockTransportFactory {
        async fn connect(
            &self,
            _identity: &SessionIdentity,
        ) -> Result<(Arc<dyn Transport>, mpsc::Receiver<TransportEvent>), anyhow::Error> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            let mut epochs = self.epochs.lock().await;
            if epochs.is_empty() {
                return Err(anyhow::anyhow!("no more scripted connection epochs"));
            }
            Ok((self.transport.clone(), epochs.remove(0)))
        }
    }
}
