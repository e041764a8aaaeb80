//! Client configuration.

use tether_core::BackoffPolicy;

/// Environment variable naming the server address.
pub const ENV_SERVER_ADDR: &str = "TETHER_SERVER_ADDR";
/// Environment variable bounding reconnection attempts.
pub const ENV_MAX_ATTEMPTS: &str = "TETHER_MAX_RECONNECT_ATTEMPTS";
/// Environment variable for the initial backoff delay in milliseconds.
pub const ENV_INITIAL_BACKOFF_MS: &str = "TETHER_INITIAL_BACKOFF_MS";
/// Environment variable for the maximum backoff delay in milliseconds.
pub const ENV_MAX_BACKOFF_MS: &str = "TETHER_MAX_BACKOFF_MS";

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:7600";

/// Configuration of one [`crate::ConnectionSupervisor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address to dial (`host:port`).
    pub server_addr: String,
    /// Username to claim on every registration.
    pub username: String,
    /// Retry schedule for the reconnect loop.
    pub backoff: BackoffPolicy,
}

impl ClientConfig {
    /// Configuration with the default backoff schedule (1s initial, 30s
    /// cap, 10 attempts).
    #[must_use]
    pub fn new(server_addr: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            username: username.into(),
            backoff: BackoffPolicy::default(),
        }
    }

    /// Configuration from process environment variables, with defaults
    /// for anything unset.
    #[must_use]
    pub fn from_env(username: impl Into<String>) -> Self {
        Self::from_lookup(username, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        username: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let server_addr =
            lookup(ENV_SERVER_ADDR).unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string());

        let mut backoff = BackoffPolicy::default();

        if let Some(max_attempts) = parse_var(&lookup, ENV_MAX_ATTEMPTS) {
            backoff.max_attempts = max_attempts;
        }
        if let Some(ms) = parse_var(&lookup, ENV_INITIAL_BACKOFF_MS) {
            backoff.initial_delay = std::time::Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var(&lookup, ENV_MAX_BACKOFF_MS) {
            backoff.max_delay = std::time::Duration::from_millis(ms);
        }

        Self { server_addr, username: username.into(), backoff }
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable configuration value");
            None
        },
    }
}
