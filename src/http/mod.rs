//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, health endpoint)
//!     → request.rs (x-request-id)
//!     → pipeline.rs (route → auth → filters → outbound copy)
//!     → proxy.rs (pooled upstream call with timeouts)
//!     → response.rs (failures only; upstream responses are relayed as-is)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::{Pipeline, Stage};
pub use proxy::{UpstreamClient, UpstreamError};
pub use request::{MakeRequestUuid, X_REQUEST_ID};
pub use response::GatewayError;
pub use server::{GatewayServer, ServerError};
