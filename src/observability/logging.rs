//! Structured logging setup.
//!
//! # Responsibilities
//! - Install the global tracing subscriber once at startup
//! - Honour `RUST_LOG`, falling back to the configured level
//! - Emit JSON in production, human-readable output otherwise
//!
//! # Design Decisions
//! - `try_init` so tests and embedders that already installed a subscriber keep theirs

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, ObservabilityConfig};

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: &str) -> String {
    format!("api_gateway={level},gateway_cli={level},tower_http={level},{level}")
}

/// Install the global subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_parse() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("api_gateway=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
