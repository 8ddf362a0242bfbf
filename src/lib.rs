//! A resilient client for evaluating FluxGate feature flags against an edge server.
//!
//! # Overview
//!
//! The crate revolves around a [`Client`] that asks the edge server whether a feature is enabled
//! for an environment, optionally with key-value context (e.g., a user id). Requests are described
//! by [`EvaluationRequest`] and can be built directly or through the convenience methods on
//! [`Client`].
//!
//! Evaluation is resilient by default: server errors and network failures are retried with
//! exponential backoff, while failures that retrying cannot fix (bad request, unauthorized,
//! forbidden, not found, malformed responses) fail immediately. On top of that, the client offers
//! fallback-shaped calls ([`Client::evaluate_or`]) and conditional execution
//! ([`Client::execute`], [`Client::execute_and_return`], [`Client::execute_and_return_or`]).
//!
//! Evaluations can also be run on a bounded worker pool ([`Client::evaluate_async`]), and the
//! edge server health can be monitored with a [`HealthPoller`].
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Evaluation itself only produces two kinds of
//! errors: [`Error::InvalidArgument`] when the caller passes an empty feature key or environment
//! id, and [`Error::Evaluation`] when the edge server could not produce an answer. The latter
//! carries an [`EvaluationError`] with a classified [`EvaluationErrorKind`].
//!
//! Fallback never hides [`Error::InvalidArgument`]: it indicates a bug in the calling code rather
//! than a degraded dependency.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate with structured key-values
//! under the `fluxgate` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into evaluations and retries. Client secrets are never logged.
//!
//! # Examples
//!
//! ```no_run
//! use fluxgate::{ClientConfig, EvaluationRequest};
//!
//! let client = ClientConfig::from_base_url("http://localhost:8081")
//!     .credentials("client-id", "client-secret")
//!     .to_client()
//!     .unwrap();
//!
//! let request = EvaluationRequest::with_context("new-checkout", "prod", [("userId", "123")]);
//! if client.evaluate_or(&request, false).unwrap_or(false) {
//!     // new checkout flow
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
mod evaluator;
mod executor;
mod fallback;
mod health;
mod request;
mod response;
mod retry;
mod transport;

#[cfg(test)]
mod test_support;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, EvaluationError, EvaluationErrorKind, Result};
pub use executor::PendingEvaluation;
pub use health::{HealthPoller, HealthStatus, SERVICE_NAME};
pub use request::{ContextEntry, EvaluationRequest};
pub use response::EvaluationResponse;
pub use retry::{RetryPolicy, Sleep};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
