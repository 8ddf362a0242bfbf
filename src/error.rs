use std::{fmt, sync::Arc};

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors returned by [`Client`](crate::Client).
///
/// Only two variants are produced by flag evaluation itself: [`Error::InvalidArgument`] for
/// malformed caller input and [`Error::Evaluation`] for everything that went wrong while talking
/// to the edge server. The remaining variants come from client construction and background
/// machinery.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The caller passed an invalid argument (e.g., an empty feature key). Never retried and never
    /// subject to fallback.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Evaluation against the edge server failed.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// The default HTTP transport could not be constructed.
    #[error("failed to build HTTP client")]
    // reqwest::Error is not clonable, so we're wrapping it in an Arc.
    HttpClient(#[source] Arc<reqwest::Error>),

    /// Asynchronous evaluation was rejected because all workers are busy and the queue is full.
    #[error("async evaluation rejected: worker pool is saturated")]
    WorkerPoolSaturated,

    /// Asynchronous evaluation task terminated without producing a result.
    #[error("async evaluation terminated without a result")]
    EvaluationAbandoned,

    /// Indicates that the health poller thread panicked. This should normally never happen.
    #[error("health poller thread panicked")]
    HealthPollerPanicked,

    /// An I/O error (e.g., failure to spawn a thread).
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Returns `true` if this error was caused by malformed caller input.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Error::InvalidArgument(_))
    }

    /// Returns the underlying [`EvaluationError`], if any.
    pub fn as_evaluation_error(&self) -> Option<&EvaluationError> {
        match self {
            Error::Evaluation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

/// Classification of an evaluation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvaluationErrorKind {
    /// The edge server rejected the request (400, 401, 403 or 404). Retrying cannot help.
    ClientError,
    /// The edge server returned a server error or a 4xx status outside the terminal set.
    ServerError,
    /// No response was received (connection refused, timeout, I/O failure).
    Network,
    /// The edge server answered but the payload is missing or unparsable.
    InvalidResponse,
    /// Anything else.
    Unexpected,
}

impl EvaluationErrorKind {
    /// Whether a failure of this kind is worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            EvaluationErrorKind::ServerError | EvaluationErrorKind::Network
        )
    }
}

/// Error describing a failed flag evaluation.
///
/// Carries the identifiers of the failing evaluation (when known) and the HTTP status code when
/// the failure originated from a classified response.
#[derive(Debug, Clone)]
pub struct EvaluationError {
    kind: EvaluationErrorKind,
    message: String,
    cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
    feature_key: Option<String>,
    environment_id: Option<String>,
    status_code: Option<u16>,
}

impl EvaluationError {
    /// Create a new error of `kind` with `message` and no other details.
    pub fn new(kind: EvaluationErrorKind, message: impl Into<String>) -> EvaluationError {
        EvaluationError {
            kind,
            message: message.into(),
            cause: None,
            feature_key: None,
            environment_id: None,
            status_code: None,
        }
    }

    /// Attach an underlying cause.
    pub fn with_cause<E>(mut self, cause: E) -> EvaluationError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// Attach the identifiers of the failing evaluation.
    pub fn with_feature(
        mut self,
        feature_key: impl Into<String>,
        environment_id: impl Into<String>,
    ) -> EvaluationError {
        self.feature_key = Some(feature_key.into());
        self.environment_id = Some(environment_id.into());
        self
    }

    /// Attach the HTTP status code of the response that caused the failure.
    pub fn with_status_code(mut self, status_code: u16) -> EvaluationError {
        self.status_code = Some(status_code);
        self
    }

    /// Classification of the failure.
    pub fn kind(&self) -> EvaluationErrorKind {
        self.kind
    }

    /// Human-readable description without the identifying details.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The underlying failure, if any.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// Feature key of the failing evaluation.
    pub fn feature_key(&self) -> Option<&str> {
        self.feature_key.as_deref()
    }

    /// Environment id of the failing evaluation.
    pub fn environment_id(&self) -> Option<&str> {
        self.environment_id.as_deref()
    }

    /// Status code of the response that caused the failure.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Returns `true` iff a positive status code is present. A zero code counts as absent.
    pub fn has_status_code(&self) -> bool {
        self.status_code.is_some_and(|code| code > 0)
    }

    /// Shorthand for `self.kind().is_retryable()`.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(feature_key) = &self.feature_key {
            write!(f, ", feature_key={feature_key}")?;
        }
        if let Some(environment_id) = &self.environment_id {
            write!(f, ", environment_id={environment_id}")?;
        }
        if let Some(status_code) = self.status_code.filter(|code| *code > 0) {
            write!(f, ", status_code={status_code}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EvaluationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}
