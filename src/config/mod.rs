//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (interpolate ${VAR}, parse & deserialize)
//!     → validation.rs (semantic checks, unreachable-route warnings)
//!     → GatewayConfig (validated, immutable)
//!     → compiled into RouteTable / TokenVerifier at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AuthConfig, AuthPolicy, GatewayConfig, ListenerConfig, RouteConfig};
pub use validation::ValidationError;
