use std::{fmt, sync::Arc, time::Duration};

use crate::{
    retry::{RetryPolicy, Sleep},
    transport::Transport,
    Client, Result,
};

/// Configuration for [`Client`].
///
/// All settings have defaults, so a config built with [`ClientConfig::from_base_url`] or
/// [`ClientConfig::default`] is immediately usable.
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use fluxgate::ClientConfig;
/// let client = ClientConfig::from_base_url("http://edge.internal:8081")
///     .credentials("client-id", "client-secret")
///     .retry_attempts(5)
///     .retry_delay(Duration::from_millis(200))
///     .to_client()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) base_url: String,
    pub(crate) client_id: Option<String>,
    pub(crate) client_secret: Option<String>,
    pub(crate) connection_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) retry_attempts: u32,
    pub(crate) retry_delay: Duration,
    pub(crate) max_retry_delay: Duration,
    pub(crate) retry_multiplier: f64,
    pub(crate) fallback_enabled: bool,
    pub(crate) default_fallback_value: bool,
    pub(crate) health_check_enabled: bool,
    pub(crate) health_check_timeout: Duration,
    pub(crate) health_check_interval: Duration,
    pub(crate) health_check_jitter: Duration,
    pub(crate) async_core_threads: usize,
    pub(crate) async_max_threads: usize,
    pub(crate) async_queue_capacity: usize,
    pub(crate) enabled: bool,
    pub(crate) metrics_enabled: bool,
    pub(crate) caching_enabled: bool,
    pub(crate) cache_entry_ttl: Duration,
    pub(crate) cache_max_size: usize,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) sleep: Option<Arc<dyn Sleep>>,
}

impl ClientConfig {
    /// Default base URL of the edge server.
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:8081";
    /// Default value for [`ClientConfig::connection_timeout`].
    pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default value for [`ClientConfig::read_timeout`].
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
    /// Default value for [`ClientConfig::retry_attempts`].
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
    /// Default value for [`ClientConfig::retry_delay`].
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
    /// Default value for [`ClientConfig::max_retry_delay`].
    pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(10);
    /// Default value for [`ClientConfig::retry_multiplier`].
    pub const DEFAULT_RETRY_MULTIPLIER: f64 = 2.0;
    /// Default value for [`ClientConfig::health_check_timeout`].
    pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
    /// Default value for [`ClientConfig::health_check_interval`].
    pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`ClientConfig::health_check_jitter`].
    pub const DEFAULT_HEALTH_CHECK_JITTER: Duration = Duration::from_secs(3);

    /// Create a default configuration pointing at `base_url`.
    ///
    /// ```
    /// # use fluxgate::ClientConfig;
    /// ClientConfig::from_base_url("http://localhost:8081");
    /// ```
    pub fn from_base_url(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..ClientConfig::default()
        }
    }

    /// Override base URL of the edge server.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set global client credentials. They are attached to every request that does not carry its
    /// own client id and secret.
    pub fn credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Timeout for establishing a connection to the edge server.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Timeout for receiving a response from the edge server.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Total number of attempts for retryable failures (server errors and network failures),
    /// including the first attempt.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Delay before the first retry.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Upper bound for the delay between retries.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    /// Factor applied to the retry delay after each retry.
    pub fn retry_multiplier(mut self, multiplier: f64) -> Self {
        self.retry_multiplier = multiplier;
        self
    }

    /// Whether fallback-shaped calls return the fallback value when evaluation fails. When
    /// disabled, they return the evaluation error instead.
    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.fallback_enabled = enabled;
        self
    }

    /// Fallback value used by [`Client::evaluate_or_default`].
    pub fn default_fallback_value(mut self, value: bool) -> Self {
        self.default_fallback_value = value;
        self
    }

    /// Whether [`Client::start_health_poller`] starts a poller. [`Client::is_healthy`] is
    /// available either way.
    pub fn health_check_enabled(mut self, enabled: bool) -> Self {
        self.health_check_enabled = enabled;
        self
    }

    /// Timeout of a single health check.
    pub fn health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout = timeout;
        self
    }

    /// Interval between health checks issued by [`HealthPoller`](crate::HealthPoller).
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Random jitter subtracted from the health check interval. This helps to avoid multiple
    /// instances probing the edge server in lockstep.
    pub fn health_check_jitter(mut self, jitter: Duration) -> Self {
        self.health_check_jitter = jitter;
        self
    }

    /// Size of the tokio runtime used for asynchronous evaluation: `core` runtime workers, at most
    /// `max` evaluations running at once, and at most `queue_capacity` more waiting for a thread.
    /// Further submissions are rejected.
    pub fn async_pool(mut self, core: usize, max: usize, queue_capacity: usize) -> Self {
        self.async_core_threads = core;
        self.async_max_threads = max;
        self.async_queue_capacity = queue_capacity;
        self
    }

    /// Whether the feature-flag client should be constructed at all. See
    /// [`ClientConfig::to_client_if_enabled`].
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reserved for metrics collection. Not consumed by the client.
    pub fn metrics_enabled(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Reserved for evaluation caching. The client does not cache evaluations; every call reaches
    /// the edge server regardless of these settings.
    pub fn caching(mut self, enabled: bool, entry_ttl: Duration, max_size: usize) -> Self {
        self.caching_enabled = enabled;
        self.cache_entry_ttl = entry_ttl;
        self.cache_max_size = max_size;
        self
    }

    /// Replace the HTTP transport. Defaults to [`ReqwestTransport`](crate::ReqwestTransport)
    /// configured with the connection and read timeouts.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Replace the function used to wait between retries. Defaults to [`std::thread::sleep`].
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use fluxgate::ClientConfig;
    /// let config = ClientConfig::default().sleep(|delay: Duration| {
    ///     println!("would wait {delay:?}");
    /// });
    /// ```
    pub fn sleep(mut self, sleep: impl Sleep + 'static) -> Self {
        self.sleep = Some(Arc::new(sleep));
        self
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_delay: self.retry_delay,
            max_delay: self.max_retry_delay,
            multiplier: self.retry_multiplier,
        }
    }

    /// Create a new [`Client`] using this configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`](crate::Error::InvalidBaseUrl) if the base URL does not parse.
    /// - [`Error::HttpClient`](crate::Error::HttpClient) if the default transport cannot be built.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }

    /// Create a new [`Client`] unless the client is disabled with
    /// [`ClientConfig::enabled`]`(false)`, in which case `Ok(None)` is returned.
    ///
    /// ```
    /// # use fluxgate::ClientConfig;
    /// let client = ClientConfig::default().enabled(false).to_client_if_enabled().unwrap();
    /// assert!(client.is_none());
    /// ```
    pub fn to_client_if_enabled(self) -> Result<Option<Client>> {
        if !self.enabled {
            log::info!(target: "fluxgate", "feature flag client is disabled");
            return Ok(None);
        }
        self.to_client().map(Some)
    }
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            client_id: None,
            client_secret: None,
            connection_timeout: ClientConfig::DEFAULT_CONNECTION_TIMEOUT,
            read_timeout: ClientConfig::DEFAULT_READ_TIMEOUT,
            retry_attempts: ClientConfig::DEFAULT_RETRY_ATTEMPTS,
            retry_delay: ClientConfig::DEFAULT_RETRY_DELAY,
            max_retry_delay: ClientConfig::DEFAULT_MAX_RETRY_DELAY,
            retry_multiplier: ClientConfig::DEFAULT_RETRY_MULTIPLIER,
            fallback_enabled: true,
            default_fallback_value: false,
            health_check_enabled: true,
            health_check_timeout: ClientConfig::DEFAULT_HEALTH_CHECK_TIMEOUT,
            health_check_interval: ClientConfig::DEFAULT_HEALTH_CHECK_INTERVAL,
            health_check_jitter: ClientConfig::DEFAULT_HEALTH_CHECK_JITTER,
            async_core_threads: 2,
            async_max_threads: 10,
            async_queue_capacity: 100,
            enabled: true,
            metrics_enabled: true,
            caching_enabled: false,
            cache_entry_ttl: Duration::from_secs(5 * 60),
            cache_max_size: 1000,
            transport: None,
            sleep: None,
        }
    }
}

// Hand-written to keep the client secret out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("connection_timeout", &self.connection_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("retry_multiplier", &self.retry_multiplier)
            .field("fallback_enabled", &self.fallback_enabled)
            .field("default_fallback_value", &self.default_fallback_value)
            .field("health_check_enabled", &self.health_check_enabled)
            .field("health_check_timeout", &self.health_check_timeout)
            .field("health_check_interval", &self.health_check_interval)
            .field("health_check_jitter", &self.health_check_jitter)
            .field("async_core_threads", &self.async_core_threads)
            .field("async_max_threads", &self.async_max_threads)
            .field("async_queue_capacity", &self.async_queue_capacity)
            .field("enabled", &self.enabled)
            .field("metrics_enabled", &self.metrics_enabled)
            .field("caching_enabled", &self.caching_enabled)
            .field("cache_entry_ttl", &self.cache_entry_ttl)
            .field("cache_max_size", &self.cache_max_size)
            .field("custom_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::ClientConfig;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();

        assert_eq!(config.base_url, "http://localhost:8081");
        assert_eq!(config.client_id, None);
        assert_eq!(config.connection_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(1));
        assert_eq!(config.max_retry_delay, Duration::from_secs(10));
        assert_eq!(config.retry_multiplier, 2.0);
        assert!(config.fallback_enabled);
        assert!(!config.default_fallback_value);
        assert!(config.enabled);
        assert!(config.health_check_enabled);
        assert!(!config.caching_enabled);
        assert_eq!(config.cache_entry_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_max_size, 1000);
        assert_eq!(
            (
                config.async_core_threads,
                config.async_max_threads,
                config.async_queue_capacity
            ),
            (2, 10, 100)
        );
    }

    #[test]
    fn retry_policy_reflects_settings() {
        let policy = ClientConfig::default()
            .retry_attempts(5)
            .retry_delay(Duration::from_millis(50))
            .max_retry_delay(Duration::from_millis(400))
            .retry_multiplier(3.0)
            .retry_policy();

        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(50));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
        assert_eq!(policy.multiplier, 3.0);
    }

    #[test]
    fn debug_redacts_client_secret() {
        let config = ClientConfig::default().credentials("my-client", "top-secret");

        let rendered = format!("{config:?}");

        assert!(rendered.contains("my-client"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("top-secret"));
    }

    #[test]
    fn disabled_config_builds_no_client() {
        let client = ClientConfig::default()
            .enabled(false)
            .to_client_if_enabled()
            .unwrap();

        assert!(client.is_none());
    }
}
