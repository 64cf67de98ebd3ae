//! Upstream forwarding.
//!
//! # Responsibilities
//! - Own the pooled HTTP client shared by all routes
//! - Enforce connect and response timeouts
//! - Classify failures as unavailable (502) or timed out (504)
//!
//! # Design Decisions
//! - No retries: a failed call surfaces directly to the caller
//! - Dropping the returned future cancels the call and releases its connection
//! - Response bodies are streamed, never buffered

use std::error::Error as StdError;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;

use crate::config::schema::TimeoutConfig;
use crate::http::response::GatewayError;

/// Why an upstream call failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("request failed: {0}")]
    Request(String),
}

impl UpstreamError {
    /// Metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::ConnectTimeout => "connect_timeout",
            UpstreamError::Timeout(_) => "timeout",
            UpstreamError::Connect(_) => "connect",
            UpstreamError::Request(_) => "request",
        }
    }

    fn classify(err: hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            if caused_by_timeout(&err) {
                UpstreamError::ConnectTimeout
            } else {
                UpstreamError::Connect(error_chain(&err))
            }
        } else {
            UpstreamError::Request(error_chain(&err))
        }
    }
}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::ConnectTimeout | UpstreamError::Timeout(_) => {
                GatewayError::UpstreamTimeout
            }
            UpstreamError::Connect(_) | UpstreamError::Request(_) => {
                GatewayError::UpstreamUnavailable
            }
        }
    }
}

fn caused_by_timeout(err: &(dyn StdError + 'static)) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Pooled client for upstream services.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_millis(timeouts.connect_ms)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(timeouts.pool_idle_secs))
            .build(connector);

        Self {
            client,
            timeout: Duration::from_millis(timeouts.upstream_ms),
        }
    }

    /// Default response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `request` and wait for the response head.
    ///
    /// `timeout` overrides the default for this call.
    pub async fn forward(
        &self,
        request: Request<Body>,
        timeout: Option<Duration>,
    ) -> Result<Response<Body>, UpstreamError> {
        let limit = timeout.unwrap_or(self.timeout);
        match tokio::time::timeout(limit, self.client.request(request)).await {
            Ok(Ok(response)) => Ok(response.map(Body::new)),
            Ok(Err(err)) => Err(UpstreamError::classify(err)),
            Err(_) => Err(UpstreamError::Timeout(limit)),
        }
    }
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
