//! Authenticated API gateway library.
//!
//! Matches inbound paths against an ordered route table, verifies bearer
//! tokens against the identity provider's published keys, projects verified
//! claims into `X-User-*` headers and proxies the request upstream.

// Core subsystems
pub mod auth;
pub mod config;
pub mod filters;
pub mod http;
pub mod routing;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
