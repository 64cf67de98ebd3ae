//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → router.rs (ordered route scan)
//!     → matcher.rs (glob pattern evaluation)
//!     → Return: matched Route or None (404)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse patterns, upstream URIs, filter chains
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (segment walk only)
//! - Deterministic: same input always matches same route
//! - First match wins (declaration order)

pub mod matcher;
pub mod router;

pub use matcher::{PathPattern, PatternError};
pub use router::{Route, RouteError, RouteTable, Shadowed, Upstream};
