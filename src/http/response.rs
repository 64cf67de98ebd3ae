//! Error responses.
//!
//! # Responsibilities
//! - Map pipeline failures to HTTP status codes
//! - Render a generic JSON body, never the internal reason
//!
//! # Design Decisions
//! - 401 always carries `WWW-Authenticate: Bearer`
//! - Successful upstream responses never pass through here; they are relayed as-is

use axum::http::header::{self, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Terminal failure of a proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("no route matches the request path")]
    RouteNotFound,
    #[error("authentication required")]
    AuthenticationRequired,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("upstream unavailable")]
    UpstreamUnavailable,
    #[error("upstream timed out")]
    UpstreamTimeout,
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
            GatewayError::AuthenticationRequired | GatewayError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message shown to the caller.
    fn public_message(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound => "Not Found",
            GatewayError::AuthenticationRequired | GatewayError::InvalidCredentials => {
                "Unauthorized"
            }
            GatewayError::UpstreamUnavailable => "Bad Gateway",
            GatewayError::UpstreamTimeout => "Gateway Timeout",
            GatewayError::BadRequest(_) => "Bad Request",
        }
    }

    fn www_authenticate(&self) -> Option<HeaderValue> {
        match self {
            GatewayError::AuthenticationRequired => Some(HeaderValue::from_static("Bearer")),
            GatewayError::InvalidCredentials => Some(HeaderValue::from_static(
                "Bearer error=\"invalid_token\"",
            )),
            _ => None,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.public_message() }));
        let mut response = (self.status(), body).into_response();
        if let Some(challenge) = self.www_authenticate() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, challenge);
        }
        response
    }
}
