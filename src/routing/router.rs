//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes in declaration order
//! - Look up the first route whose patterns match a path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) pattern scan (acceptable for typical route counts)
//! - First match wins; a route declared after a broader one is unreachable

use std::time::Duration;

use axum::http::uri::{Authority, PathAndQuery, Scheme, Uri};
use thiserror::Error;

use crate::config::schema::{AuthPolicy, RouteConfig};
use crate::filters::{FilterChain, FilterError};
use crate::routing::matcher::{PathPattern, PatternError};

/// Errors produced while compiling the route table.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route '{route}': {source}")]
    Pattern {
        route: String,
        #[source]
        source: PatternError,
    },
    #[error("route '{route}': invalid upstream '{upstream}': {reason}")]
    Upstream {
        route: String,
        upstream: String,
        reason: String,
    },
    #[error("route '{route}': {source}")]
    Filter {
        route: String,
        #[source]
        source: FilterError,
    },
    #[error("route '{0}' declares no path patterns")]
    NoPatterns(String),
}

/// Upstream base URI of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
    /// Base path without a trailing slash, empty for the root.
    base_path: String,
}

impl Upstream {
    /// Parse `http://host:port[/base]`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let uri: Uri = raw.parse().map_err(|e: axum::http::uri::InvalidUri| e.to_string())?;
        let scheme = uri.scheme().cloned().ok_or("missing scheme")?;
        if scheme != Scheme::HTTP {
            return Err(format!("unsupported scheme '{scheme}', only http is supported"));
        }
        let authority = uri.authority().cloned().ok_or("missing host")?;
        if uri.query().is_some() {
            return Err("query strings are not allowed".to_string());
        }
        let base_path = uri.path().trim_end_matches('/').to_string();
        Ok(Self {
            scheme,
            authority,
            base_path,
        })
    }

    /// Outbound URI for a (possibly rewritten) path and the original query.
    pub fn target(&self, path: &str, query: Option<&str>) -> Result<Uri, axum::http::Error> {
        let mut path_and_query = format!("{}{}", self.base_path, path);
        if path_and_query.is_empty() {
            path_and_query.push('/');
        }
        if let Some(query) = query {
            path_and_query.push('?');
            path_and_query.push_str(query);
        }
        let path_and_query: PathAndQuery = path_and_query.parse()?;
        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()?)
    }
}

impl std::fmt::Display for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path)
    }
}

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub id: String,
    pub patterns: Vec<PathPattern>,
    pub upstream: Upstream,
    pub auth: AuthPolicy,
    pub filters: FilterChain,
    /// Per-route override of the upstream timeout.
    pub timeout: Option<Duration>,
}

impl Route {
    pub fn from_config(config: &RouteConfig) -> Result<Self, RouteError> {
        if config.paths.is_empty() {
            return Err(RouteError::NoPatterns(config.id.clone()));
        }
        let patterns = config
            .paths
            .iter()
            .map(|p| PathPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| RouteError::Pattern {
                route: config.id.clone(),
                source,
            })?;
        let upstream = Upstream::parse(&config.upstream).map_err(|reason| RouteError::Upstream {
            route: config.id.clone(),
            upstream: config.upstream.clone(),
            reason,
        })?;
        let filters = FilterChain::from_config(&config.filters).map_err(|source| RouteError::Filter {
            route: config.id.clone(),
            source,
        })?;

        Ok(Self {
            id: config.id.clone(),
            patterns,
            upstream,
            auth: config.auth,
            filters,
            timeout: config.timeout_ms.map(Duration::from_millis),
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(path))
    }
}

/// A route that can never be selected because an earlier route covers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shadowed {
    pub route: String,
    pub pattern: String,
    pub by_route: String,
    pub by_pattern: String,
}

/// Ordered, immutable route table.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let routes = configs
            .iter()
            .map(Route::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// First route in declaration order with a matching pattern.
    pub fn find(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Patterns fully covered by a pattern of an earlier route.
    pub fn shadowed(&self) -> Vec<Shadowed> {
        let mut found = Vec::new();
        for (i, route) in self.routes.iter().enumerate() {
            for pattern in &route.patterns {
                let cover = self.routes[..i].iter().find_map(|earlier| {
                    earlier
                        .patterns
                        .iter()
                        .find(|p| p.covers(pattern))
                        .map(|p| (earlier, p))
                });
                if let Some((earlier, by)) = cover {
                    found.push(Shadowed {
                        route: route.id.clone(),
                        pattern: pattern.to_string(),
                        by_route: earlier.id.clone(),
                        by_pattern: by.to_string(),
                    });
                }
            }
        }
        found
    }
}
