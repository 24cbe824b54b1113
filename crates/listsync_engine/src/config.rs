//! Configuration for the sync engine and transport.

use rand::Rng;
use std::time::Duration;

/// Endpoint used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8080/socket";

/// Environment variable overriding the server endpoint.
pub const SERVER_URL_ENV: &str = "LISTSYNC_SERVER_URL";

/// Environment variable holding a previously issued session token.
pub const SESSION_TOKEN_ENV: &str = "LISTSYNC_SESSION_TOKEN";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Websocket endpoint.
    pub server_url: String,
    /// Token announced on every new connection when challenged.
    pub session_token: Option<String>,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Reconnect backoff.
    pub retry: RetryConfig,
    /// Capacity of the engine's command mailbox.
    pub mailbox_capacity: usize,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            session_token: None,
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            mailbox_capacity: 64,
        }
    }

    /// Builds a configuration from `LISTSYNC_SERVER_URL` and
    /// `LISTSYNC_SESSION_TOKEN`, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut config =
            Self::new(non_empty(SERVER_URL_ENV).unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()));
        config.session_token = non_empty(SESSION_TOKEN_ENV);
        config
    }

    /// Sets the session token.
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the mailbox capacity.
    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_URL)
    }
}

/// Configuration for reconnect backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of connection attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration giving up after `max_attempts`.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::default()
        }
    }

    /// Creates a configuration that retries forever.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.add_jitter = jitter;
        self
    }

    /// Returns true once `attempts` connection attempts have been used up.
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // up to 25%
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("ws://sync.example.com/socket")
            .with_session_token("tok")
            .with_connect_timeout(Duration::from_secs(2))
            .with_mailbox_capacity(0);

        assert_eq!(config.server_url, "ws://sync.example.com/socket");
        assert_eq!(config.session_token.as_deref(), Some("tok"));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.mailbox_capacity, 1);
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.session_token.is_none());
        assert!(!config.retry.exhausted(1_000_000));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            (SERVER_URL_ENV, "ws://other:9000/socket"),
            (SESSION_TOKEN_ENV, "abc"),
        ]
        .into_iter()
        .collect();
        let config = SyncConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.server_url, "ws://other:9000/socket");
        assert_eq!(config.session_token.as_deref(), Some("abc"));
    }

    #[test]
    fn blank_values_fall_back() {
        let config = SyncConfig::from_lookup(|_| Some("  ".to_string()));
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert!(config.session_token.is_none());
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::unlimited()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
        assert!(delay2 <= Duration::from_millis(250));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
        assert!(!config.exhausted(9));
        assert!(config.exhausted(10));
    }
}
