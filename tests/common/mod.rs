//! Shared utilities for integration testing.
//!
//! Every mock binds an ephemeral port so tests can run in parallel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use api_gateway::config::schema::{AuthPolicy, RouteConfig};
use api_gateway::{GatewayConfig, GatewayServer, Shutdown};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::net::TcpListener;

pub const REALM_PATH: &str = "/realms/veer";
pub const TRUSTED_KID: &str = "test-kid";
pub const ROGUE_KID: &str = "rogue-kid";

pub fn fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {}: {e}", path.display()))
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

// ---------------------------------------------------------------------------
// Identity provider
// ---------------------------------------------------------------------------

/// Keycloak-shaped identity provider serving discovery and JWKS documents.
pub struct MockIdentityProvider {
    pub addr: SocketAddr,
    jwks_hits: Arc<AtomicUsize>,
}

#[derive(Clone)]
struct IdpState {
    issuer: String,
    jwks: Value,
    jwks_hits: Arc<AtomicUsize>,
}

impl MockIdentityProvider {
    pub async fn start() -> Self {
        let jwks: Value = serde_json::from_str(&fixture("trusted_jwks.json")).unwrap();
        Self::start_with(jwks).await
    }

    pub async fn start_with(jwks: Value) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let jwks_hits = Arc::new(AtomicUsize::new(0));
        let state = IdpState {
            issuer: format!("http://{addr}{REALM_PATH}"),
            jwks,
            jwks_hits: jwks_hits.clone(),
        };

        let router = Router::new()
            .route(
                &format!("{REALM_PATH}/.well-known/openid-configuration"),
                get(discovery),
            )
            .route(
                &format!("{REALM_PATH}/protocol/openid-connect/certs"),
                get(certs),
            )
            .with_state(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Self { addr, jwks_hits }
    }

    pub fn issuer(&self) -> String {
        format!("http://{}{REALM_PATH}", self.addr)
    }

    /// How many times the JWKS document was fetched.
    pub fn jwks_hits(&self) -> usize {
        self.jwks_hits.load(Ordering::SeqCst)
    }
}

async fn discovery(State(state): State<IdpState>) -> Json<Value> {
    Json(json!({
        "issuer": state.issuer,
        "jwks_uri": format!("{}/protocol/openid-connect/certs", state.issuer),
        "id_token_signing_alg_values_supported": ["RS256"],
    }))
}

async fn certs(State(state): State<IdpState>) -> Json<Value> {
    state.jwks_hits.fetch_add(1, Ordering::SeqCst);
    Json(state.jwks)
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Claims of the canonical test user, valid for five minutes.
pub fn user_claims(issuer: &str) -> Value {
    json!({
        "iss": issuer,
        "sub": "some-user-id",
        "email": "test-user@veer.com",
        "preferred_username": "test-user",
        "locale": "Poland",
        "iat": now(),
        "exp": now() + 300,
    })
}

pub fn sign(claims: &Value, kid: &str, pem_fixture: &str) -> String {
    let mut header = Header::new(jsonwebtoken::Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(fixture(pem_fixture).as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Token signed by the identity provider's published key.
pub fn trusted_token(claims: &Value) -> String {
    sign(claims, TRUSTED_KID, "trusted_rsa.pem")
}

/// Token signed by a key the identity provider never published.
pub fn rogue_token(claims: &Value) -> String {
    sign(claims, ROGUE_KID, "rogue_rsa.pem")
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

/// A request as seen by the mock upstream.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query.
    pub uri: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// How the mock upstream answers.
#[derive(Debug, Clone)]
pub struct UpstreamBehavior {
    pub status: StatusCode,
    pub delay: Duration,
    pub body: &'static str,
}

impl Default for UpstreamBehavior {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            delay: Duration::ZERO,
            body: r#"{"upstream":"ok"}"#,
        }
    }
}

/// Upstream service recording every request it receives.
pub struct MockUpstream {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[derive(Clone)]
struct UpstreamState {
    behavior: UpstreamBehavior,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        Self::start_with(UpstreamBehavior::default()).await
    }

    pub async fn start_with(behavior: UpstreamBehavior) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = UpstreamState {
            behavior,
            requests: requests.clone(),
        };
        let router = Router::new().fallback(record).with_state(state);
        let addr = serve(router).await;
        Self { addr, requests }
    }

    pub fn uri(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn record(State(state): State<UpstreamState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: parts.method.to_string(),
        uri: parts
            .uri
            .path_and_query()
            .map(|pq| pq.to_string())
            .unwrap_or_default(),
        headers: parts.headers,
        body,
    });

    if !state.behavior.delay.is_zero() {
        tokio::time::sleep(state.behavior.delay).await;
    }
    (
        state.behavior.status,
        [("content-type", "application/json"), ("x-upstream", "mock")],
        state.behavior.body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

pub fn route(id: &str, path: &str, upstream: &str, auth: AuthPolicy, filters: &[&str]) -> RouteConfig {
    RouteConfig {
        id: id.to_string(),
        paths: vec![path.to_string()],
        upstream: upstream.to_string(),
        auth,
        filters: filters.iter().map(|f| f.to_string()).collect(),
        timeout_ms: None,
    }
}

/// The two routes of the system: a public auth service and an authenticated user service.
pub fn veer_config(issuer: &str, auth_upstream: &str, user_upstream: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.issuer = issuer.to_string();
    config.timeouts.connect_ms = 500;
    config.timeouts.upstream_ms = 2_000;
    config.routes.push(route(
        "auth",
        "/api/auth/**",
        auth_upstream,
        AuthPolicy::Public,
        &[],
    ));
    config.routes.push(route(
        "user",
        "/api/user/**",
        user_upstream,
        AuthPolicy::Authenticated,
        &["AddUserDetails"],
    ));
    config
}

/// A gateway running on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let server = GatewayServer::new(config).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        tokio::spawn(async move {
            server.run(listener, signal).await.unwrap();
        });
        Self { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
