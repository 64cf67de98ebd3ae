//! Path rewriting and static header filters.

use axum::http::header::{HeaderName, HeaderValue};
use axum::http::HeaderMap;

use crate::filters::{Filter, FilterContext, RequestDelta};

/// Drops the first `parts` path segments (`StripPrefix=2`: `/api/user/42` → `/42`).
#[derive(Debug, Clone, Copy)]
pub struct StripPrefix {
    parts: usize,
}

impl StripPrefix {
    pub fn new(parts: usize) -> Self {
        Self { parts }
    }
}

impl Filter for StripPrefix {
    fn name(&self) -> &'static str {
        "StripPrefix"
    }

    fn apply(&self, ctx: &FilterContext<'_>) -> RequestDelta {
        let trimmed = ctx.path.trim_start_matches('/');
        let rest = trimmed.splitn(self.parts.saturating_add(1), '/').nth(self.parts).unwrap_or("");
        RequestDelta::path(format!("/{rest}"))
    }
}

/// Prepends a fixed prefix (`PrefixPath=/v1`: `/42` → `/v1/42`).
#[derive(Debug, Clone)]
pub struct PrefixPath {
    prefix: String,
}

impl PrefixPath {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Filter for PrefixPath {
    fn name(&self) -> &'static str {
        "PrefixPath"
    }

    fn apply(&self, ctx: &FilterContext<'_>) -> RequestDelta {
        let path = if ctx.path == "/" {
            self.prefix.clone()
        } else {
            format!("{}{}", self.prefix, ctx.path)
        };
        RequestDelta::path(path)
    }
}

/// Sets a static request header.
#[derive(Debug, Clone)]
pub struct SetRequestHeader {
    name: HeaderName,
    value: HeaderValue,
}

impl SetRequestHeader {
    pub fn new(name: HeaderName, value: HeaderValue) -> Self {
        Self { name, value }
    }
}

impl Filter for SetRequestHeader {
    fn name(&self) -> &'static str {
        "SetRequestHeader"
    }

    fn apply(&self, _ctx: &FilterContext<'_>) -> RequestDelta {
        let mut headers = HeaderMap::with_capacity(1);
        headers.insert(self.name.clone(), self.value.clone());
        RequestDelta::headers(headers)
    }
}
