//! HTTP transport used to talk to the edge server.
//!
//! The evaluation engine only depends on the [`Transport`] trait. [`ReqwestTransport`] is the
//! default implementation; tests and embedders may provide their own.
use std::{sync::Arc, time::Duration};

use reqwest::{header::HeaderMap, Method, StatusCode, Url};

use crate::{Error, Result};

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body, if any.
    pub body: Option<Vec<u8>>,
    /// Per-request timeout overriding the transport default.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Create a bodyless request.
    pub fn new(method: Method, url: Url) -> HttpRequest {
        HttpRequest {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
        }
    }
}

/// A response received from the server. Any status code is a response, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Response status code.
    pub status: StatusCode,
    /// Raw response body. Empty if the server sent no body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a response with the given status and body.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> HttpResponse {
        HttpResponse {
            status,
            body: body.into(),
        }
    }
}

/// Failure to obtain any response from the server.
#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    /// No response was received: connection refused, timeout, broken connection.
    #[error("{0}")]
    Network(#[source] Arc<dyn std::error::Error + Send + Sync>),
    /// Any other transport failure (e.g., an invalid request).
    #[error("{0}")]
    Other(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wrap `err` as a network failure.
    pub fn network(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> TransportError {
        TransportError::Network(Arc::from(err.into()))
    }

    /// Wrap `err` as an unclassified transport failure.
    pub fn other(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> TransportError {
        TransportError::Other(Arc::from(err.into()))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> TransportError {
        let is_network = err.is_connect() || err.is_timeout() || err.is_request() || err.is_body();
        let err = Arc::new(err.without_url());
        if is_network {
            TransportError::Network(err)
        } else {
            TransportError::Other(err)
        }
    }
}

/// Something that can execute an [`HttpRequest`].
///
/// Implementations must return `Ok` for every response received, regardless of its status code,
/// and `Err` only when no response could be obtained.
pub trait Transport: Send + Sync {
    /// Execute `request` and wait for the response.
    fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Default [`Transport`] backed by a blocking `reqwest` client.
pub struct ReqwestTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    /// Create a transport with the given connect and read timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HttpClient`] if the underlying client cannot be initialized (e.g., TLS
    /// backend failure).
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<ReqwestTransport> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .build()
            .map_err(|err| Error::HttpClient(Arc::new(err)))?;
        Ok(ReqwestTransport { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();

        Ok(HttpResponse { status, body })
    }
}
