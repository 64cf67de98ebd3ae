//! Authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <jwt>
//!     → verifier.rs (parse, resolve key, verify signature and claims)
//!     → keys.rs (kid → key, fetched from the identity provider)
//!     → identity.rs (VerifiedIdentity for this request only)
//! ```
//!
//! # Design Decisions
//! - Fails closed: any verification or key-fetch problem rejects the request
//! - Reject reasons stay internal; callers only see 401
//! - Keys are process-wide, identities are per-request

pub mod identity;
pub mod keys;
pub mod verifier;

use std::sync::Arc;
use std::time::Duration;

pub use identity::VerifiedIdentity;
pub use keys::{KeySetError, KeySource, TrustedKeySet};
pub use verifier::{RejectReason, TokenVerifier};

use crate::config::schema::{AuthConfig, TimeoutConfig};

/// Build the verifier described by configuration.
pub fn verifier_from_config(
    auth: &AuthConfig,
    timeouts: &TimeoutConfig,
) -> Result<TokenVerifier, KeySetError> {
    let source = match &auth.jwks_uri {
        Some(uri) => KeySource::JwksUri(url::Url::parse(uri)?),
        None => KeySource::Discovery(url::Url::parse(&auth.issuer)?),
    };
    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeouts.identity_provider_ms))
        .build()?;
    let keys = TrustedKeySet::remote(
        source,
        http,
        Duration::from_secs(auth.min_refresh_interval_secs),
    );

    let mut verifier = TokenVerifier::new(Arc::new(keys), auth.issuer.clone())
        .with_leeway(auth.leeway_secs)
        .with_claim_names(auth.claims.clone());
    if let Some(audience) = &auth.audience {
        verifier = verifier.with_audience(audience.clone());
    }
    Ok(verifier)
}
