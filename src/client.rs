use std::sync::Arc;

#[cfg(doc)]
use crate::Error;
use crate::{
    evaluator::Evaluator,
    executor::{AsyncExecutor, AsyncExecutorConfig},
    ClientConfig, EvaluationRequest, HealthPoller, PendingEvaluation, Result,
};

/// A client for the FluxGate edge server.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// `Client` is cheap to clone: clones share the HTTP transport and the tokio runtime used for
/// async evaluation. The runtime shuts down once the last clone is dropped.
///
/// # Call shapes
///
/// Every evaluation is available by feature key and environment id, with additional context, or
/// from a prebuilt [`EvaluationRequest`]. Plain calls return [`Error::Evaluation`] when the edge
/// server cannot answer; see the `*_or` methods for fallback-shaped calls and
/// [`Client::execute`] for conditional execution.
///
/// # Examples
/// ```no_run
/// # use fluxgate::ClientConfig;
/// let client = ClientConfig::from_base_url("http://localhost:8081").to_client().unwrap();
/// if client.is_enabled("new-checkout", "prod").unwrap_or(false) {
///     // ...
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    evaluator: Arc<Evaluator>,
    executor: Arc<AsyncExecutor>,
    pub(crate) config: Arc<ClientConfig>,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidBaseUrl`] if the base URL does not parse.
    /// - [`Error::HttpClient`] if the default transport cannot be built.
    /// - [`Error::Io`] if the async runtime cannot be started.
    pub fn new(config: ClientConfig) -> Result<Client> {
        let evaluator = Evaluator::new(&config)?;

        log::info!(target: "fluxgate",
            base_url = config.base_url.as_str(),
            retry_attempts = config.retry_attempts,
            fallback_enabled = config.fallback_enabled;
            "initialized feature flag client");
        if config.caching_enabled {
            log::warn!(target: "fluxgate",
                "evaluation caching is configured but not supported; every evaluation reaches the edge server");
        }

        let executor = AsyncExecutor::new(AsyncExecutorConfig {
            core_threads: config.async_core_threads,
            max_threads: config.async_max_threads,
            queue_capacity: config.async_queue_capacity,
        })?;

        Ok(Client {
            evaluator: Arc::new(evaluator),
            executor: Arc::new(executor),
            config: Arc::new(config),
        })
    }

    /// Check whether `feature_key` is enabled in `environment_id`.
    ///
    /// Transient failures (server errors, network failures) are retried with exponential backoff
    /// before an error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if either argument is empty. No request is sent.
    /// - [`Error::Evaluation`] if the edge server could not produce an answer.
    pub fn is_enabled(&self, feature_key: &str, environment_id: &str) -> Result<bool> {
        self.evaluate(&EvaluationRequest::new(feature_key, environment_id))
    }

    /// Check whether `feature_key` is enabled in `environment_id` for the given context.
    ///
    /// Context pairs are sent in iteration order.
    ///
    /// ```no_run
    /// # fn test(client: &fluxgate::Client) -> fluxgate::Result<()> {
    /// let enabled =
    ///     client.is_enabled_with_context("new-checkout", "prod", [("userId", "123")])?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled`].
    pub fn is_enabled_with_context<K, V>(
        &self,
        feature_key: &str,
        environment_id: &str,
        context: impl IntoIterator<Item = (K, V)>,
    ) -> Result<bool>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.evaluate(&EvaluationRequest::with_context(
            feature_key,
            environment_id,
            context,
        ))
    }

    /// Evaluate a prebuilt request.
    ///
    /// If `request` carries no credentials and global credentials are configured, the global ones
    /// are sent instead. `request` itself is never modified.
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled`].
    pub fn evaluate(&self, request: &EvaluationRequest) -> Result<bool> {
        self.evaluator.evaluate(request)
    }

    /// Asynchronous version of [`Client::is_enabled`].
    ///
    /// # Errors
    ///
    /// Returns immediately with:
    /// - [`Error::InvalidArgument`] if either argument is empty.
    /// - [`Error::WorkerPoolSaturated`] if the worker pool cannot accept more work.
    ///
    /// Evaluation errors are reported through the returned [`PendingEvaluation`].
    pub fn is_enabled_async(
        &self,
        feature_key: &str,
        environment_id: &str,
    ) -> Result<PendingEvaluation> {
        self.evaluate_async(EvaluationRequest::new(feature_key, environment_id))
    }

    /// Asynchronous version of [`Client::is_enabled_with_context`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_async`].
    pub fn is_enabled_with_context_async<K, V>(
        &self,
        feature_key: &str,
        environment_id: &str,
        context: impl IntoIterator<Item = (K, V)>,
    ) -> Result<PendingEvaluation>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.evaluate_async(EvaluationRequest::with_context(
            feature_key,
            environment_id,
            context,
        ))
    }

    /// Asynchronous version of [`Client::evaluate`]. The evaluation runs on the client's tokio
    /// runtime; this call never blocks waiting for a thread. The returned handle can be
    /// `.await`ed or waited on with [`PendingEvaluation::wait`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::is_enabled_async`].
    pub fn evaluate_async(&self, request: EvaluationRequest) -> Result<PendingEvaluation> {
        request.validate()?;

        let evaluator = Arc::clone(&self.evaluator);
        self.executor
            .submit(move || evaluator.evaluate(&request))
    }

    /// Check the edge server's health endpoint.
    ///
    /// Returns `true` iff the edge server answered with a 2xx status within the health check
    /// timeout. Never retries.
    pub fn is_healthy(&self) -> bool {
        self.evaluator.is_healthy()
    }

    /// Start a [`HealthPoller`] that checks the edge server every
    /// [`ClientConfig::health_check_interval`].
    ///
    /// Returns `Ok(None)` if health checks are disabled with
    /// [`ClientConfig::health_check_enabled`]`(false)`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the poller thread failed to start.
    pub fn start_health_poller(&self) -> Result<Option<HealthPoller>> {
        if !self.config.health_check_enabled {
            log::debug!(target: "fluxgate", "health checks are disabled");
            return Ok(None);
        }

        let evaluator = Arc::clone(&self.evaluator);
        HealthPoller::start_with_check(
            move || evaluator.is_healthy(),
            self.config.health_check_interval,
            self.config.health_check_jitter,
        )
        .map(Some)
    }
}
