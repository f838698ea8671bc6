use std::time::Duration;

/// Tuning knobs for the signaling client. Defaults mirror the production
/// deployment; tests shrink the timers.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the REST backend, without trailing slash.
    pub api_base_url: String,
    /// Base URL of the push channel (`ws://` or `wss://`), without trailing slash.
    pub push_base_url: String,
    /// Interval between liveness probes on the push channel. The probe keeps
    /// intermediary proxies from idling the connection out; it does not detect
    /// half-open sockets.
    pub heartbeat_interval: Duration,
    /// First reconnect delay; subsequent attempts scale linearly.
    pub reconnect_base_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// After this many consecutive failed reconnects the client stops and
    /// surfaces a persistent-disconnected status for manual retry.
    pub max_reconnect_attempts: u32,
    /// Interval for the online-users dashboard poll.
    pub online_poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/v1".to_string(),
            push_base_url: "ws://localhost:8000/api/v1".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_delay: Duration::from_millis(3000),
            reconnect_max_delay: Duration::from_millis(30000),
            max_reconnect_attempts: 10,
            online_poll_interval: Duration::from_secs(5),
        }
    }
}
