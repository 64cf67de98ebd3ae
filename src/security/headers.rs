//! Header manipulation at the trust boundary.
//!
//! # Responsibilities
//! - Strip client-supplied identity headers (`X-User-*`) from every request
//! - Strip hop-by-hop headers before forwarding
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//!
//! # Design Decisions
//! - The whole `x-user-` prefix is reserved, not just the four projected names
//! - Inbound X-Forwarded-For is extended, never replaced

use std::net::IpAddr;

use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::HeaderMap;

use crate::filters::claims::{X_USER_COUNTRY, X_USER_EMAIL, X_USER_ID, X_USER_NAME};

/// Prefix owned by the gateway. Clients can never set headers under it.
pub const RESERVED_PREFIX: &str = "x-user-";

/// Identity headers the gateway itself produces.
pub const IDENTITY_HEADERS: [HeaderName; 4] = [X_USER_ID, X_USER_EMAIL, X_USER_NAME, X_USER_COUNTRY];

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Hop-by-hop headers (RFC 9110 §7.6.1) plus the obsolete `proxy-connection`.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Whether `name` belongs to the reserved identity namespace.
pub fn is_reserved(name: &HeaderName) -> bool {
    name.as_str().starts_with(RESERVED_PREFIX)
}

/// Remove every reserved header. Returns how many values were dropped.
pub fn strip_reserved(headers: &mut HeaderMap) -> usize {
    let reserved: Vec<HeaderName> = headers.keys().filter(|n| is_reserved(n)).cloned().collect();
    let mut removed = 0;
    for name in reserved {
        removed += headers.get_all(&name).iter().count();
        headers.remove(&name);
    }
    removed
}

/// Remove hop-by-hop headers, including any listed in `Connection`, and `Host`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("proxy-connection");
    headers.remove(header::HOST);
}

/// Append the client address to X-Forwarded-For and set Proto/Host.
pub fn add_forwarded(headers: &mut HeaderMap, peer: Option<IpAddr>, proto: &str, host: Option<&HeaderValue>) {
    if let Some(peer) = peer {
        let existing: Vec<&str> = headers
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        let chain = if existing.is_empty() {
            peer.to_string()
        } else {
            format!("{}, {}", existing.join(", "), peer)
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(proto) {
        headers.insert(X_FORWARDED_PROTO, value);
    }
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_namespace() {
        for name in IDENTITY_HEADERS.iter() {
            assert!(is_reserved(name));
        }
        assert!(is_reserved(&HeaderName::from_static("x-user-roles")));
        assert!(!is_reserved(&HeaderName::from_static("x-username")));
        assert!(!is_reserved(&header::AUTHORIZATION));
    }

    #[test]
    fn test_strip_reserved_removes_all_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-user-id", HeaderValue::from_static("admin"));
        headers.append("x-user-id", HeaderValue::from_static("root"));
        headers.insert("X-User-Country", HeaderValue::from_static("PL"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        assert_eq!(strip_reserved(&mut headers), 3);
        assert!(headers.get("x-user-id").is_none());
        assert!(headers.get("x-user-country").is_none());
        assert_eq!(headers["x-request-id"], "abc");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::HOST, HeaderValue::from_static("gateway:8080"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::ACCEPT], "*/*");
    }

    #[test]
    fn test_forwarded_chain_is_extended() {
        let mut headers = HeaderMap::new();
        headers.insert(&X_FORWARDED_FOR, HeaderValue::from_static("203.0.113.7"));
        let host = HeaderValue::from_static("api.veer.com");

        add_forwarded(&mut headers, Some("10.0.0.2".parse().unwrap()), "http", Some(&host));
        assert_eq!(headers[&X_FORWARDED_FOR], "203.0.113.7, 10.0.0.2");
        assert_eq!(headers[&X_FORWARDED_PROTO], "http");
        assert_eq!(headers[&X_FORWARDED_HOST], "api.veer.com");
    }

    #[test]
    fn test_forwarded_without_peer() {
        let mut headers = HeaderMap::new();
        add_forwarded(&mut headers, None, "https", None);
        assert!(headers.get(&X_FORWARDED_FOR).is_none());
        assert_eq!(headers[&X_FORWARDED_PROTO], "https");
    }
}
