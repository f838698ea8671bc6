//! Push-channel heartbeat.
//!
//! A fixed-interval text probe whose only job is keeping intermediary proxies
//! from idling the connection out. Half-open detection is not attempted here;
//! a dead socket surfaces as a transport close, which the run loop handles.

use crate::client::SignalClient;
use crate::dispatch::HEARTBEAT_PROBE;
use crate::transport::Transport;
use log::{debug, warn};
use std::sync::Arc;

impl SignalClient {
    /// Spawned once per connection epoch with that epoch's transport.
    /// Exits when the stored transport no longer matches (the epoch ended,
    /// possibly with a replacement already connected), when the client is
    /// disconnected, or when shutdown is signaled.
    pub(crate) async fn heartbeat_loop(self: Arc<Self>, epoch_transport: Arc<dyn Transport>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {
                    let current = self.transport.lock().await.clone();
                    let epoch_is_current = current
                        .as_ref()
                        .is_some_and(|t| std::ptr::addr_eq(Arc::as_ptr(t), Arc::as_ptr(&epoch_transport)));
                    if !epoch_is_current {
                        debug!(target: "Client/Keepalive", "Connection epoch ended, exiting heartbeat loop.");
                        return;
                    }
                    if !self.is_connected() {
                        debug!(target: "Client/Keepalive", "Not connected, exiting heartbeat loop.");
                        return;
                    }

                    debug!(target: "Client/Keepalive", "Sending liveness probe");
                    if let Err(e) = epoch_transport.send(HEARTBEAT_PROBE).await {
                        // The resulting transport close drives reconnection.
                        warn!(target: "Client/Keepalive", "Probe send failed: {e}");
                        return;
                    }
                }
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client/Keepalive", "Shutdown signaled, exiting heartbeat loop.");
                    return;
                }
            }
        }
    }
}
