//! Per-request control flow.
//!
//! # State Machine
//! ```text
//! Received → Matched → AuthChecked → Filtered → Proxied → Completed
//!     │          │           │                      │
//!     └─ 404     └─ 401      └─ 400                 └─ 502 / 504
//! ```
//!
//! # Responsibilities
//! - Strip reserved identity headers before anything else looks at the request
//! - Resolve the route, apply its authentication policy, run its filters
//! - Build the outbound copy and forward it upstream
//! - Relay the upstream response unmodified
//!
//! # Design Decisions
//! - Fails closed: an authenticated route never reaches upstream without an identity
//! - Filters return deltas; the pipeline alone assembles the outbound request
//! - Failures are terminal, nothing is retried

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, Request};
use axum::response::{IntoResponse, Response};
use tracing::Instrument;

use crate::auth::{RejectReason, TokenVerifier, VerifiedIdentity};
use crate::config::schema::AuthPolicy;
use crate::filters::{merge_headers, RequestDelta};
use crate::http::proxy::UpstreamClient;
use crate::http::request::request_id;
use crate::http::response::GatewayError;
use crate::observability::metrics;
use crate::routing::{Route, RouteTable};
use crate::security::headers::{add_forwarded, strip_hop_by_hop, strip_reserved};

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Matched,
    AuthChecked,
    Filtered,
    Proxied,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Matched => "matched",
            Stage::AuthChecked => "auth_checked",
            Stage::Filtered => "filtered",
            Stage::Proxied => "proxied",
            Stage::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one request, kept for logging and metrics.
#[derive(Debug)]
struct Progress {
    stage: Stage,
    route: Option<String>,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug_assert!(next > self.stage);
        tracing::trace!(from = %self.stage, to = %next, "Stage transition");
        self.stage = next;
    }
}

/// Shared, immutable request handler.
#[derive(Debug, Clone)]
pub struct Pipeline {
    routes: Arc<RouteTable>,
    verifier: Option<Arc<TokenVerifier>>,
    upstream: UpstreamClient,
    forwarded_headers: bool,
    scheme: &'static str,
}

impl Pipeline {
    pub fn new(
        routes: Arc<RouteTable>,
        verifier: Option<Arc<TokenVerifier>>,
        upstream: UpstreamClient,
    ) -> Self {
        Self {
            routes,
            verifier,
            upstream,
            forwarded_headers: true,
            scheme: "http",
        }
    }

    /// Toggle X-Forwarded-* on proxied requests.
    pub fn with_forwarded_headers(mut self, enabled: bool) -> Self {
        self.forwarded_headers = enabled;
        self
    }

    /// Scheme the gateway itself is served on, reported as X-Forwarded-Proto.
    pub fn with_scheme(mut self, scheme: &'static str) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run one request to completion.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let started = Instant::now();
        let method = request.method().to_string();
        let span = tracing::info_span!(
            "request",
            request_id = %request_id(request.headers()),
            method = %request.method(),
            path = %request.uri().path(),
        );

        async move {
            let mut progress = Progress {
                stage: Stage::Received,
                route: None,
            };

            let response = match self.process(request, &mut progress).await {
                Ok(response) => {
                    progress.advance(Stage::Completed);
                    tracing::debug!(
                        route = progress.route.as_deref().unwrap_or(metrics::NO_ROUTE),
                        status = response.status().as_u16(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Request completed"
                    );
                    response
                }
                Err(err) => {
                    tracing::info!(
                        route = progress.route.as_deref().unwrap_or(metrics::NO_ROUTE),
                        stage = %progress.stage,
                        status = err.status().as_u16(),
                        error = %err,
                        "Request rejected"
                    );
                    err.into_response()
                }
            };

            metrics::record_request(
                &method,
                response.status().as_u16(),
                progress.route.as_deref().unwrap_or(metrics::NO_ROUTE),
                started,
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: Request<Body>,
        progress: &mut Progress,
    ) -> Result<Response, GatewayError> {
        let (mut parts, body) = request.into_parts();

        let stripped = strip_reserved(&mut parts.headers);
        if stripped > 0 {
            tracing::debug!(count = stripped, "Dropped client-supplied identity headers");
        }

        let route = self
            .routes
            .find(parts.uri.path())
            .ok_or(GatewayError::RouteNotFound)?;
        progress.route = Some(route.id.clone());
        progress.advance(Stage::Matched);

        let identity = match route.auth {
            AuthPolicy::Public => None,
            AuthPolicy::Authenticated => Some(self.authenticate(&parts.headers).await?),
        };
        progress.advance(Stage::AuthChecked);

        let delta = route
            .filters
            .apply(&route.id, parts.uri.path(), identity.as_ref());
        progress.advance(Stage::Filtered);

        let outbound = self.outbound(route, parts, body, delta)?;
        tracing::debug!(route = %route.id, upstream = %outbound.uri(), "Forwarding request");

        let response = self
            .upstream
            .forward(outbound, route.timeout)
            .await
            .map_err(|err| {
                tracing::warn!(route = %route.id, upstream = %route.upstream, error = %err, "Upstream call failed");
                metrics::record_upstream_error(&route.id, err.kind());
                GatewayError::from(err)
            })?;
        progress.advance(Stage::Proxied);

        Ok(response)
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<VerifiedIdentity, GatewayError> {
        let result = match &self.verifier {
            Some(verifier) => verifier.verify_header(headers.get(header::AUTHORIZATION)).await,
            None => {
                tracing::error!("Authenticated route reached without a token verifier");
                Err(RejectReason::KeySetUnavailable)
            }
        };

        result.map_err(|reason| {
            tracing::info!(reason = %reason, "Bearer token rejected");
            metrics::record_auth_rejection(reason.as_str());
            match reason {
                RejectReason::MissingCredentials => GatewayError::AuthenticationRequired,
                _ => GatewayError::InvalidCredentials,
            }
        })
    }

    /// Assemble the request sent upstream from the inbound parts and the filter delta.
    fn outbound(
        &self,
        route: &Route,
        parts: Parts,
        body: Body,
        delta: RequestDelta,
    ) -> Result<Request<Body>, GatewayError> {
        let path = delta.path.as_deref().unwrap_or(parts.uri.path());
        let uri = route
            .upstream
            .target(path, parts.uri.query())
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let host = parts.headers.get(header::HOST).cloned();

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        if self.forwarded_headers {
            add_forwarded(&mut headers, peer, self.scheme, host.as_ref());
        }
        merge_headers(&mut headers, &delta.headers);

        let mut request = Request::new(body);
        *request.method_mut() = parts.method;
        *request.uri_mut() = uri;
        *request.headers_mut() = headers;
        Ok(request)
    }
}
