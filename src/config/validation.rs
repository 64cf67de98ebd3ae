//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Compile every route once so pattern, upstream and filter errors surface at load
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect unreachable routes
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Unreachable routes are warnings: declaration order is the documented contract

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AuthPolicy, GatewayConfig};
use crate::routing::router::{Route, RouteError, RouteTable, Shadowed};

/// A single semantic problem in a configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid listener bind address '{0}'")]
    BindAddress(String),
    #[error("invalid metrics address '{0}'")]
    MetricsAddress(String),
    #[error("health path must be a literal path starting with '/': '{0}'")]
    HealthPath(String),
    #[error("route #{0} has an empty id")]
    EmptyRouteId(usize),
    #[error("duplicate route id '{0}'")]
    DuplicateRouteId(String),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("route '{0}' has a zero timeout")]
    ZeroRouteTimeout(String),
    #[error("auth.issuer is required because route '{0}' is authenticated")]
    MissingIssuer(String),
    #[error("auth.{field} is not a valid URL: '{value}'")]
    InvalidUrl { field: &'static str, value: String },
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    let health = &config.listener.health_path;
    if !health.is_empty() && (!health.starts_with('/') || health.contains(&['{', '}', '*'][..])) {
        errors.push(ValidationError::HealthPath(health.clone()));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    let mut seen = HashSet::new();
    for (i, route) in config.routes.iter().enumerate() {
        if route.id.trim().is_empty() {
            errors.push(ValidationError::EmptyRouteId(i));
        } else if !seen.insert(route.id.as_str()) {
            errors.push(ValidationError::DuplicateRouteId(route.id.clone()));
        }
        if route.timeout_ms == Some(0) {
            errors.push(ValidationError::ZeroRouteTimeout(route.id.clone()));
        }
        if let Err(e) = Route::from_config(route) {
            errors.push(e.into());
        }
    }

    let authenticated = config
        .routes
        .iter()
        .find(|r| r.auth == AuthPolicy::Authenticated);
    if let Some(route) = authenticated {
        if config.auth.issuer.trim().is_empty() {
            errors.push(ValidationError::MissingIssuer(route.id.clone()));
        }
    }
    if !config.auth.issuer.is_empty() && url::Url::parse(&config.auth.issuer).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field: "issuer",
            value: config.auth.issuer.clone(),
        });
    }
    if let Some(jwks_uri) = &config.auth.jwks_uri {
        if url::Url::parse(jwks_uri).is_err() {
            errors.push(ValidationError::InvalidUrl {
                field: "jwks_uri",
                value: jwks_uri.clone(),
            });
        }
    }

    let timeouts = &config.timeouts;
    for (name, value) in [
        ("connect_ms", timeouts.connect_ms),
        ("upstream_ms", timeouts.upstream_ms),
        ("identity_provider_ms", timeouts.identity_provider_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(name));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Routes that can never be selected. Empty when the routes do not compile.
pub fn route_warnings(config: &GatewayConfig) -> Vec<Shadowed> {
    RouteTable::from_config(&config.routes)
        .map(|table| table.shadowed())
        .unwrap_or_default()
}
