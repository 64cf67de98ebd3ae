//! Verified caller identity.

use serde::Serialize;

/// Identity extracted from a bearer token that passed verification.
///
/// Scoped to a single request; never cached across requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedIdentity {
    /// Opaque user identifier (`sub`). Always present and non-empty.
    pub subject: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub country: Option<String>,
}

impl VerifiedIdentity {
    /// Identity with only a subject.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            email: None,
            username: None,
            country: None,
        }
    }
}
