//! Bearer token verification.
//!
//! # Steps
//! 1. Extract a `Bearer` credential from `Authorization`
//! 2. Parse the token header
//! 3. Resolve the signing key by `kid`
//! 4. Verify the signature
//! 5. Verify `exp`, `nbf`, `iss` (and `aud` when configured)
//! 6. Extract identity claims
//!
//! Every failure is a [`RejectReason`]; callers report a generic 401 and log
//! the reason.

use std::fmt;
use std::sync::Arc;

use axum::http::HeaderValue;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};
use serde_json::{Map, Value};

use crate::auth::identity::VerifiedIdentity;
use crate::auth::keys::{KeySetError, TrustedKeySet};
use crate::config::schema::ClaimNames;

/// Why a token was rejected. Never sent to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    MissingCredentials,
    MalformedToken,
    UnknownKey,
    InvalidSignature,
    Expired,
    NotYetValid,
    IssuerMismatch,
    AudienceMismatch,
    MissingSubject,
    KeySetUnavailable,
}

impl RejectReason {
    /// Stable code used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingCredentials => "missing_credentials",
            RejectReason::MalformedToken => "malformed_token",
            RejectReason::UnknownKey => "unknown_key",
            RejectReason::InvalidSignature => "invalid_signature",
            RejectReason::Expired => "expired",
            RejectReason::NotYetValid => "not_yet_valid",
            RejectReason::IssuerMismatch => "issuer_mismatch",
            RejectReason::AudienceMismatch => "audience_mismatch",
            RejectReason::MissingSubject => "missing_subject",
            RejectReason::KeySetUnavailable => "key_set_unavailable",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verifies bearer tokens against a [`TrustedKeySet`].
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<TrustedKeySet>,
    issuer: String,
    audience: Option<String>,
    leeway_secs: u64,
    claims: ClaimNames,
}

impl TokenVerifier {
    pub fn new(keys: Arc<TrustedKeySet>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: None,
            leeway_secs: 0,
            claims: ClaimNames::default(),
        }
    }

    /// Require the `aud` claim to contain this value.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Clock skew tolerance for time-based claims.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Source claim names for identity extraction.
    pub fn with_claim_names(mut self, claims: ClaimNames) -> Self {
        self.claims = claims;
        self
    }

    pub fn keys(&self) -> &Arc<TrustedKeySet> {
        &self.keys
    }

    /// Verify the value of an `Authorization` header.
    pub async fn verify_header(
        &self,
        authorization: Option<&HeaderValue>,
    ) -> Result<VerifiedIdentity, RejectReason> {
        let token = bearer_token(authorization).ok_or(RejectReason::MissingCredentials)?;
        self.verify(token).await
    }

    /// Verify a raw compact JWS token.
    pub async fn verify(&self, token: &str) -> Result<VerifiedIdentity, RejectReason> {
        let header = decode_header(token).map_err(|_| RejectReason::MalformedToken)?;
        let kid = header.kid.as_deref().ok_or(RejectReason::UnknownKey)?;

        let key = self.keys.resolve(kid).await.map_err(|e| match e {
            KeySetError::UnknownKey(_) => RejectReason::UnknownKey,
            other => {
                tracing::error!(error = %other, "Trusted key set unavailable");
                RejectReason::KeySetUnavailable
            }
        })?;

        // The token cannot pick a different algorithm than the key was published for.
        if header.alg != key.algorithm {
            return Err(RejectReason::InvalidSignature);
        }

        let mut validation = Validation::new(key.algorithm);
        validation.leeway = self.leeway_secs;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss"]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        let data = decode::<Map<String, Value>>(token, &key.key, &validation)
            .map_err(|e| classify(e.kind()))?;

        identity_from_claims(&data.claims, &self.claims)
    }
}

/// Extract the credential of a `Bearer` authorization header.
pub fn bearer_token(authorization: Option<&HeaderValue>) -> Option<&str> {
    let value = authorization?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return None;
    }
    Some(token)
}

fn classify(kind: &ErrorKind) -> RejectReason {
    match kind {
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::InvalidKeyFormat
        | ErrorKind::InvalidRsaKey(_)
        | ErrorKind::InvalidEcdsaKey => RejectReason::InvalidSignature,
        ErrorKind::ExpiredSignature => RejectReason::Expired,
        ErrorKind::ImmatureSignature => RejectReason::NotYetValid,
        ErrorKind::InvalidIssuer => RejectReason::IssuerMismatch,
        ErrorKind::InvalidAudience => RejectReason::AudienceMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "iss" => RejectReason::IssuerMismatch,
        ErrorKind::MissingRequiredClaim(claim) if claim == "aud" => RejectReason::AudienceMismatch,
        _ => RejectReason::MalformedToken,
    }
}

fn identity_from_claims(
    claims: &Map<String, Value>,
    names: &ClaimNames,
) -> Result<VerifiedIdentity, RejectReason> {
    let subject = string_claim(claims, &names.subject)
        .filter(|sub| HeaderValue::from_bytes(sub.as_bytes()).is_ok())
        .ok_or(RejectReason::MissingSubject)?;

    Ok(VerifiedIdentity {
        subject,
        email: string_claim(claims, &names.email),
        username: string_claim(claims, &names.username),
        country: string_claim(claims, &names.country),
    })
}

/// A non-empty string claim. Other JSON types are treated as absent.
fn string_claim(claims: &Map<String, Value>, name: &str) -> Option<String> {
    match claims.get(name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}
