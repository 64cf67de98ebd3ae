//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (strip X-User-*, before routing)
//!     → ... authentication, filters ...
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//!     → Upstream
//! ```
//!
//! # Design Decisions
//! - No trust in client input: identity headers only ever come from a verified token
//! - Body size limits are enforced by tower-http at the router

pub mod headers;
