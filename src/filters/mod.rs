//! Request filters.
//!
//! # Data Flow
//! ```text
//! (route, current path, Option<VerifiedIdentity>)
//!     → filter 1 → RequestDelta
//!     → filter 2 (sees path rewritten by filter 1) → RequestDelta
//!     → ...
//!     → merged RequestDelta applied by the pipeline to its outbound copy
//! ```
//!
//! # Design Decisions
//! - Filters are pure: they never see or mutate the request, only return a delta
//! - Order-sensitive: later header deltas overwrite earlier ones, path rewrites chain
//! - Idempotent: the same inputs always produce the same delta

pub mod claims;
pub mod rewrite;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;
use thiserror::Error;

use crate::auth::VerifiedIdentity;
use crate::security::headers::is_reserved;

pub use claims::{project, AddUserDetails};
pub use rewrite::{PrefixPath, SetRequestHeader, StripPrefix};

/// Largest segment count `StripPrefix` accepts.
pub const MAX_STRIP_SEGMENTS: usize = 64;

/// Errors produced while parsing filter definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}'")]
    Unknown(String),
    #[error("invalid arguments for filter {filter}: {reason}")]
    InvalidArgs { filter: String, reason: String },
}

/// What a filter sees.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Route id.
    pub route: &'a str,
    /// Path as rewritten by the filters before this one.
    pub path: &'a str,
    /// Present only on authenticated routes whose token verified.
    pub identity: Option<&'a VerifiedIdentity>,
}

/// Changes a filter asks the pipeline to make to the outbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDelta {
    /// Headers to set, replacing any existing values with the same name.
    pub headers: HeaderMap,
    /// Replacement path.
    pub path: Option<String>,
}

impl RequestDelta {
    pub fn headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            path: None,
        }
    }

    pub fn path(path: impl Into<String>) -> Self {
        Self {
            headers: HeaderMap::new(),
            path: Some(path.into()),
        }
    }

    /// Layer `later` on top of this delta.
    pub fn merge(&mut self, later: RequestDelta) {
        merge_headers(&mut self.headers, &later.headers);
        if later.path.is_some() {
            self.path = later.path;
        }
    }
}

/// Set every header of `delta` on `target`, dropping earlier values of the same name.
pub fn merge_headers(target: &mut HeaderMap, delta: &HeaderMap) {
    for name in delta.keys() {
        target.remove(name);
    }
    for (name, value) in delta.iter() {
        target.append(name.clone(), value.clone());
    }
}

/// A composable step between authentication and proxying.
pub trait Filter: Send + Sync + fmt::Debug {
    /// Name as written in configuration.
    fn name(&self) -> &'static str;

    /// Compute the delta for this request.
    fn apply(&self, ctx: &FilterContext<'_>) -> RequestDelta;
}

/// Ordered filters of one route.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    /// Parse filter definitions such as `["AddUserDetails", "StripPrefix=2"]`.
    pub fn from_config(definitions: &[String]) -> Result<Self, FilterError> {
        let filters = definitions
            .iter()
            .map(|d| d.parse::<FilterSpec>().map(FilterSpec::build))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter in order and fold their deltas.
    pub fn apply(
        &self,
        route: &str,
        path: &str,
        identity: Option<&VerifiedIdentity>,
    ) -> RequestDelta {
        let mut merged = RequestDelta::default();
        for filter in &self.filters {
            let current = merged.path.as_deref().unwrap_or(path);
            let ctx = FilterContext {
                route,
                path: current,
                identity,
            };
            let delta = filter.apply(&ctx);
            tracing::trace!(route = %route, filter = filter.name(), "Filter applied");
            merged.merge(delta);
        }
        merged
    }
}

/// A parsed filter definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    AddUserDetails,
    StripPrefix(usize),
    PrefixPath(String),
    SetRequestHeader(HeaderName, HeaderValue),
}

impl FilterSpec {
    pub fn build(self) -> Arc<dyn Filter> {
        match self {
            FilterSpec::AddUserDetails => Arc::new(AddUserDetails),
            FilterSpec::StripPrefix(parts) => Arc::new(StripPrefix::new(parts)),
            FilterSpec::PrefixPath(prefix) => Arc::new(PrefixPath::new(prefix)),
            FilterSpec::SetRequestHeader(name, value) => {
                Arc::new(SetRequestHeader::new(name, value))
            }
        }
    }
}

impl FromStr for FilterSpec {
    type Err = FilterError;

    /// Shortcut syntax: `Name` or `Name=arg1,arg2`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, args) = match s.split_once('=') {
            Some((name, args)) => (name.trim(), Some(args)),
            None => (s.trim(), None),
        };
        let invalid = |reason: &str| FilterError::InvalidArgs {
            filter: name.to_string(),
            reason: reason.to_string(),
        };

        match (name, args) {
            ("AddUserDetails", None) => Ok(FilterSpec::AddUserDetails),
            ("AddUserDetails", Some(_)) => Err(invalid("takes no arguments")),
            ("StripPrefix", Some(n)) => match n.trim().parse::<usize>() {
                Ok(parts) if parts <= MAX_STRIP_SEGMENTS => Ok(FilterSpec::StripPrefix(parts)),
                Ok(_) => Err(invalid("segment count is too large")),
                Err(_) => Err(invalid("expected a segment count")),
            },
            ("PrefixPath", Some(prefix)) => {
                let prefix = prefix.trim();
                if !prefix.starts_with('/') || prefix.len() < 2 {
                    return Err(invalid("prefix must start with '/'"));
                }
                Ok(FilterSpec::PrefixPath(prefix.trim_end_matches('/').to_string()))
            }
            ("SetRequestHeader", Some(args)) => {
                let (header, value) = args
                    .split_once(',')
                    .ok_or_else(|| invalid("expected <name>,<value>"))?;
                let header = HeaderName::from_str(header.trim())
                    .map_err(|_| invalid("invalid header name"))?;
                if is_reserved(&header) {
                    return Err(invalid("identity headers cannot be set statically"));
                }
                let value = HeaderValue::from_str(value.trim())
                    .map_err(|_| invalid("invalid header value"))?;
                Ok(FilterSpec::SetRequestHeader(header, value))
            }
            ("StripPrefix" | "PrefixPath" | "SetRequestHeader", None) => {
                Err(invalid("missing arguments"))
            }
            (other, _) => Err(FilterError::Unknown(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(defs: &[&str]) -> FilterChain {
        let defs: Vec<String> = defs.iter().map(|d| d.to_string()).collect();
        FilterChain::from_config(&defs).unwrap()
    }

    #[test]
    fn test_parse_filter_specs() {
        assert_eq!("AddUserDetails".parse::<FilterSpec>(), Ok(FilterSpec::AddUserDetails));
        assert_eq!("StripPrefix=2".parse::<FilterSpec>(), Ok(FilterSpec::StripPrefix(2)));
        assert_eq!(
            "PrefixPath=/v1/".parse::<FilterSpec>(),
            Ok(FilterSpec::PrefixPath("/v1".into()))
        );
        assert_eq!(
            "SetRequestHeader=X-Gateway, veer".parse::<FilterSpec>(),
            Ok(FilterSpec::SetRequestHeader(
                HeaderName::from_static("x-gateway"),
                HeaderValue::from_static("veer")
            ))
        );
    }

    #[test]
    fn test_parse_filter_errors() {
        assert_eq!(
            "Retry=3".parse::<FilterSpec>(),
            Err(FilterError::Unknown("Retry".into()))
        );
        assert!(matches!(
            "StripPrefix=two".parse::<FilterSpec>(),
            Err(FilterError::InvalidArgs { .. })
        ));
        assert_eq!("StripPrefix=64".parse::<FilterSpec>(), Ok(FilterSpec::StripPrefix(64)));
        assert!(matches!(
            "StripPrefix=65".parse::<FilterSpec>(),
            Err(FilterError::InvalidArgs { .. })
        ));
        assert!(matches!(
            "StripPrefix=18446744073709551615".parse::<FilterSpec>(),
            Err(FilterError::InvalidArgs { .. })
        ));
        assert!(matches!(
            "StripPrefix".parse::<FilterSpec>(),
            Err(FilterError::InvalidArgs { .. })
        ));
        assert!(matches!(
            "SetRequestHeader=X-User-Id,admin".parse::<FilterSpec>(),
            Err(FilterError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn test_chain_order_matters_for_paths() {
        let strip_then_prefix = chain(&["StripPrefix=2", "PrefixPath=/v1"]);
        let prefix_then_strip = chain(&["PrefixPath=/v1", "StripPrefix=2"]);

        let a = strip_then_prefix.apply("user", "/api/user/42", None);
        let b = prefix_then_strip.apply("user", "/api/user/42", None);
        assert_eq!(a.path.as_deref(), Some("/v1/42"));
        assert_eq!(b.path.as_deref(), Some("/user/42"));
    }

    #[test]
    fn test_later_headers_overwrite_earlier() {
        let c = chain(&["SetRequestHeader=X-Stage,one", "SetRequestHeader=X-Stage,two"]);
        let delta = c.apply("r", "/", None);
        let values: Vec<_> = delta.headers.get_all("x-stage").iter().collect();
        assert_eq!(values, vec![&HeaderValue::from_static("two")]);
    }

    #[test]
    fn test_chain_is_idempotent() {
        let identity = VerifiedIdentity::new("u-1");
        let c = chain(&["AddUserDetails", "StripPrefix=1"]);
        let first = c.apply("r", "/api/x", Some(&identity));
        let second = c.apply("r", "/api/x", Some(&identity));
        assert_eq!(first, second);
    }

    #[test]
    fn test_merge_headers_replaces_all_values() {
        let mut target = HeaderMap::new();
        target.append("x-user-id", HeaderValue::from_static("forged-1"));
        target.append("x-user-id", HeaderValue::from_static("forged-2"));
        target.insert("accept", HeaderValue::from_static("*/*"));

        let mut delta = HeaderMap::new();
        delta.insert("x-user-id", HeaderValue::from_static("real"));
        merge_headers(&mut target, &delta);

        let ids: Vec<_> = target.get_all("x-user-id").iter().collect();
        assert_eq!(ids, vec![&HeaderValue::from_static("real")]);
        assert_eq!(target.get("accept").unwrap(), "*/*");
    }
}
