//! Claim projection into identity headers.
//!
//! | Claim     | Header           |
//! |-----------|------------------|
//! | subject   | `X-User-Id`      |
//! | email     | `X-User-Email`   |
//! | username  | `X-User-Name`    |
//! | country   | `X-User-Country` |
//!
//! Absent claims produce absent headers. Values that cannot be carried in a
//! header are dropped.

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;

use crate::auth::VerifiedIdentity;
use crate::filters::{Filter, FilterContext, RequestDelta};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_EMAIL: HeaderName = HeaderName::from_static("x-user-email");
pub const X_USER_NAME: HeaderName = HeaderName::from_static("x-user-name");
pub const X_USER_COUNTRY: HeaderName = HeaderName::from_static("x-user-country");

/// Map a verified identity onto the identity headers.
pub fn project(identity: &VerifiedIdentity) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(4);
    let fields = [
        (X_USER_ID, Some(&identity.subject)),
        (X_USER_EMAIL, identity.email.as_ref()),
        (X_USER_NAME, identity.username.as_ref()),
        (X_USER_COUNTRY, identity.country.as_ref()),
    ];

    for (name, value) in fields {
        let Some(value) = value.filter(|v| !v.is_empty()) else {
            continue;
        };
        match HeaderValue::from_bytes(value.as_bytes()) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => {
                tracing::debug!(header = %name, "Claim not representable as a header value");
            }
        }
    }
    headers
}

/// Filter form of [`project`]; contributes nothing without an identity.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddUserDetails;

impl Filter for AddUserDetails {
    fn name(&self) -> &'static str {
        "AddUserDetails"
    }

    fn apply(&self, ctx: &FilterContext<'_>) -> RequestDelta {
        match ctx.identity {
            Some(identity) => RequestDelta::headers(project(identity)),
            None => RequestDelta::default(),
        }
    }
}
