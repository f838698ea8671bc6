//! Online-users dashboard poll.
//!
//! The backend reports who is reachable on the push channel; the dashboard
//! shows everyone except the local user. Polling runs only while the caller
//! keeps the task alive (the dashboard is visible), so this is a method the
//! UI spawns and drops rather than part of the run loop.

use crate::api::ApiError;
use crate::client::SignalClient;
use crate::types::OnlineUser;
use log::debug;
use std::sync::Arc;

impl SignalClient {
    /// One poll: fetches, filters out the local user, publishes on the bus.
    pub async fn poll_online_users(&self) -> Result<Vec<OnlineUser>, ApiError> {
        let users = self.api.list_online_users().await?;
        let others: Vec<OnlineUser> = users
            .into_iter()
            .filter(|u| u.user_id != self.identity().user_id)
            .collect();
        let _ = self.bus().online_users.send(Arc::new(others.clone()));
        Ok(others)
    }

    /// Polls on the configured interval until shutdown or until the caller
    /// drops the task. Poll failures are logged and skipped; the next tick
    /// retries.
    pub async fn online_users_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.online_poll_interval) => {
                    if let Err(e) = self.poll_online_users().await {
                        debug!(target: "Client/Presence", "Online-users poll failed: {e}");
                    }
                }
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client/Presence", "Shutdown signaled, exiting online-users loop.");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::api::CallApi;
    use crate::client::SignalClient;
    use crate::config::ClientConfig;
    use crate::test_utils::MockHttpClient;
    use crate::transport::mock::MockTransportFactory;
    use crate::types::{Role, SessionIdentity};
    use std::sync::Arc;

    /// The local user never shows up in their own dashboard.
    #[tokio::test]
    async fn test_poll_filters_local_user() {
        let mock = Arc::new(MockHttpClient::new());
        mock.stub(
            "GET",
            "/ws/online-users",
            200,
            r#"{"data":{"users":[{"user_id":"u-me","username":"alice"},{"user_id":"u-bob","username":"bob"}]}}"#,
        );
        let api = Arc::new(CallApi::new(mock, "http://backend"));
        let factory = Arc::new(MockTransportFactory::new(vec![]));
        let identity = SessionIdentity {
            user_id: "u-me".to_string(),
            username: "alice".to_string(),
            role: Role::Host,
        };
        let client = SignalClient::new(ClientConfig::default(), identity, factory, api);

        let mut published = client.bus().online_users.subscribe();
        let others = client.poll_online_users().await.unwrap();

        assert_eq!(others.len(), 1);
        assert_eq!(others[0].username, "bob");
        assert_eq!(published.try_recv().unwrap().len(), 1);
    }
}
