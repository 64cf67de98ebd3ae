//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, TLS, health endpoint).
    pub listener: ListenerConfig,

    /// Route definitions, evaluated in declaration order.
    pub routes: Vec<RouteConfig>,

    /// Bearer token verification settings.
    pub auth: AuthConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request hardening settings.
    pub security: SecurityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Path answered locally with `200 OK`. Empty disables it.
    pub health_path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            health_path: "/health".to_string(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Authentication policy attached to a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
    /// Proxied without credentials and without identity headers.
    Public,
    /// Requires a verified bearer token.
    #[default]
    Authenticated,
}

impl std::fmt::Display for AuthPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthPolicy::Public => f.write_str("public"),
            AuthPolicy::Authenticated => f.write_str("authenticated"),
        }
    }
}

/// Route configuration binding path patterns to an upstream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Unique, human-readable route identifier.
    pub id: String,

    /// Ordered path patterns, e.g. `/api/user/**`.
    pub paths: Vec<String>,

    /// Upstream base URI, e.g. `http://user:3003`.
    pub upstream: String,

    /// Authentication policy (default: authenticated).
    #[serde(default)]
    pub auth: AuthPolicy,

    /// Ordered filter definitions, e.g. `AddUserDetails` or `StripPrefix=2`.
    #[serde(default)]
    pub filters: Vec<String>,

    /// Upstream timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Token verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Expected `iss` claim, e.g. `https://idp.example.com/realms/veer`.
    pub issuer: String,

    /// Expected `aud` claim. Audience is not checked when unset.
    pub audience: Option<String>,

    /// JWKS endpoint. Resolved via OpenID discovery on the issuer when unset.
    pub jwks_uri: Option<String>,

    /// Clock skew tolerance for `exp`/`nbf`.
    pub leeway_secs: u64,

    /// Minimum spacing between key refreshes triggered by unknown key IDs.
    pub min_refresh_interval_secs: u64,

    /// Source claim names for the identity headers.
    pub claims: ClaimNames,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: None,
            jwks_uri: None,
            leeway_secs: 0,
            min_refresh_interval_secs: 30,
            claims: ClaimNames::default(),
        }
    }
}

/// Names of the token claims projected into identity headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClaimNames {
    pub subject: String,
    pub email: String,
    pub username: String,
    pub country: String,
}

impl Default for ClaimNames {
    fn default() -> Self {
        Self {
            subject: "sub".to_string(),
            email: "email".to_string(),
            username: "preferred_username".to_string(),
            country: "locale".to_string(),
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in milliseconds.
    pub connect_ms: u64,

    /// Upstream response timeout (until response headers) in milliseconds.
    pub upstream_ms: u64,

    /// Identity provider (discovery/JWKS) request timeout in milliseconds.
    pub identity_provider_ms: u64,

    /// Idle pooled connection lifetime in seconds.
    pub pool_idle_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: 2_000,
            upstream_ms: 30_000,
            identity_provider_ms: 5_000,
            pool_idle_secs: 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Append X-Forwarded-For/-Proto/-Host to proxied requests.
    pub forwarded_headers: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            forwarded_headers: true,
        }
    }
}
