//! The evaluation engine: validates a request, attaches credentials, sends it to the edge server,
//! classifies the outcome and retries transient failures.
use std::{
    borrow::Cow,
    sync::Arc,
    time::{Duration, Instant},
};

use reqwest::{
    header::{HeaderValue, ACCEPT, CONTENT_TYPE},
    Method, StatusCode, Url,
};

use crate::{
    error::EvaluationErrorKind,
    request::has_text,
    retry::{RetryPolicy, Sleep, ThreadSleep},
    transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError},
    ClientConfig, Error, EvaluationError, EvaluationRequest, EvaluationResponse, Result,
};

const EVALUATE_ENDPOINT: &str = "/evaluate";
const HEALTH_ENDPOINT: &str = "/health";

pub(crate) struct Evaluator {
    evaluate_url: Url,
    health_url: Url,
    transport: Arc<dyn Transport>,
    sleep: Arc<dyn Sleep>,
    retry_policy: RetryPolicy,
    client_id: Option<String>,
    client_secret: Option<String>,
    health_check_timeout: Duration,
}

impl Evaluator {
    pub(crate) fn new(config: &ClientConfig) -> Result<Evaluator> {
        let base_url = config.base_url.trim_end_matches('/');
        let evaluate_url = Url::parse(&format!("{base_url}{EVALUATE_ENDPOINT}"))
            .map_err(Error::InvalidBaseUrl)?;
        let health_url =
            Url::parse(&format!("{base_url}{HEALTH_ENDPOINT}")).map_err(Error::InvalidBaseUrl)?;

        let transport: Arc<dyn Transport> = match &config.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(ReqwestTransport::new(
                config.connection_timeout,
                config.read_timeout,
            )?),
        };
        let sleep: Arc<dyn Sleep> = match &config.sleep {
            Some(sleep) => Arc::clone(sleep),
            None => Arc::new(ThreadSleep),
        };

        Ok(Evaluator {
            evaluate_url,
            health_url,
            transport,
            sleep,
            retry_policy: config.retry_policy(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            health_check_timeout: config.health_check_timeout,
        })
    }

    /// Evaluate `request` against the edge server, retrying transient failures.
    pub(crate) fn evaluate(&self, request: &EvaluationRequest) -> Result<bool> {
        request.validate()?;

        let feature_key = request.feature_key();
        let environment_id = request.environment_id();
        log::debug!(target: "fluxgate",
            feature_key,
            environment_id,
            context:serde = request.context();
            "evaluating feature flag");

        let started = Instant::now();
        let request = self.enrich(request);
        let body = serde_json::to_vec(&*request).map_err(|err| {
            EvaluationError::new(
                EvaluationErrorKind::Unexpected,
                format!("Unexpected error evaluating feature flag: {err}"),
            )
            .with_cause(err)
            .with_feature(feature_key, environment_id)
        })?;

        let result = self.retry_policy.run(
            &*self.sleep,
            EvaluationError::is_retryable,
            |attempt, delay, err| {
                log::warn!(target: "fluxgate",
                    feature_key,
                    environment_id,
                    attempt;
                    "evaluation attempt failed, retrying in {:?}: {}", delay, err);
            },
            |_attempt| {
                self.send_evaluation(&body)
                    .map_err(|err| err.with_feature(feature_key, environment_id))
            },
        );

        match result {
            Ok(enabled) => {
                log::debug!(target: "fluxgate",
                    feature_key,
                    environment_id,
                    enabled,
                    duration_ms = started.elapsed().as_millis() as u64;
                    "feature evaluation successful");
                Ok(enabled)
            }
            Err(err) => {
                log::warn!(target: "fluxgate",
                    feature_key,
                    environment_id;
                    "feature evaluation failed: {}", err);
                Err(err.into())
            }
        }
    }

    /// Attach global credentials to requests that don't carry their own. The caller's request is
    /// never modified.
    fn enrich<'a>(&self, request: &'a EvaluationRequest) -> Cow<'a, EvaluationRequest> {
        if request.has_credentials() {
            return Cow::Borrowed(request);
        }

        match (&self.client_id, &self.client_secret) {
            (Some(client_id), Some(client_secret))
                if has_text(Some(client_id.as_str())) && has_text(Some(client_secret.as_str())) =>
            {
                log::debug!(target: "fluxgate", "enriched request with global client credentials");
                Cow::Owned(
                    request
                        .clone()
                        .with_credentials(client_id.as_str(), client_secret.as_str()),
                )
            }
            _ => Cow::Borrowed(request),
        }
    }

    fn send_evaluation(&self, body: &[u8]) -> std::result::Result<bool, EvaluationError> {
        let mut request = HttpRequest::new(Method::POST, self.evaluate_url.clone());
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        request.body = Some(body.to_vec());

        classify(self.transport.send(request))
    }

    /// Check the edge server's health endpoint. Never retries and never fails.
    pub(crate) fn is_healthy(&self) -> bool {
        let mut request = HttpRequest::new(Method::GET, self.health_url.clone());
        request.timeout = Some(self.health_check_timeout);

        match self.transport.send(request) {
            Ok(response) if response.status.is_success() => true,
            Ok(response) => {
                log::debug!(target: "fluxgate",
                    status = response.status.as_u16();
                    "health check failed: edge server returned non-success status");
                false
            }
            Err(err) => {
                log::debug!(target: "fluxgate", "health check failed: {}", err);
                false
            }
        }
    }
}

/// Statuses for which retrying cannot produce a different answer.
fn is_terminal_client_error(status: StatusCode) -> bool {
    // 400 Bad Request, 401 Unauthorized, 403 Forbidden, 404 Not Found
    matches!(status.as_u16(), 400 | 401 | 403 | 404)
}

/// Map the outcome of a single attempt to either the evaluation result or a classified error.
pub(crate) fn classify(
    result: std::result::Result<HttpResponse, TransportError>,
) -> std::result::Result<bool, EvaluationError> {
    let response = match result {
        Ok(response) => response,
        Err(err @ TransportError::Network(_)) => {
            return Err(EvaluationError::new(
                EvaluationErrorKind::Network,
                format!("Network error connecting to edge server: {err}"),
            )
            .with_cause(err));
        }
        Err(err @ TransportError::Other(_)) => {
            return Err(EvaluationError::new(
                EvaluationErrorKind::Unexpected,
                format!("Unexpected error evaluating feature flag: {err}"),
            )
            .with_cause(err));
        }
    };

    let status = response.status;
    if status.is_success() {
        return parse_body(&response);
    }

    let (kind, message) = if is_terminal_client_error(status) {
        (
            EvaluationErrorKind::ClientError,
            format!("Client error from edge server: {status}"),
        )
    } else if status.is_client_error() || status.is_server_error() {
        (
            EvaluationErrorKind::ServerError,
            format!("Server error from edge server: {status}"),
        )
    } else {
        (
            EvaluationErrorKind::InvalidResponse,
            format!("Invalid response from edge server: {status}"),
        )
    };
    Err(EvaluationError::new(kind, message).with_status_code(status.as_u16()))
}

fn parse_body(response: &HttpResponse) -> std::result::Result<bool, EvaluationError> {
    let status = response.status;
    let invalid = |reason: &str| {
        EvaluationError::new(
            EvaluationErrorKind::InvalidResponse,
            format!("Invalid response from edge server: {status}: {reason}"),
        )
        .with_status_code(status.as_u16())
    };

    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Err(invalid("empty body"));
    }

    // `null` is as good as no body at all.
    match serde_json::from_slice::<Option<EvaluationResponse>>(&response.body) {
        Ok(Some(body)) => Ok(body.enabled),
        Ok(None) => Err(invalid("empty body")),
        Err(err) => Err(invalid("malformed body").with_cause(err)),
    }
}
