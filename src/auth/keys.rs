//! Trusted signing keys of the identity provider.
//!
//! # Responsibilities
//! - Fetch the JWK set, directly or through OpenID discovery
//! - Keep only asymmetric signing keys, indexed by key ID
//! - Refresh once on an unknown key ID, throttled
//!
//! # Design Decisions
//! - The key map is published through `ArcSwap`; lookups never lock
//! - Refreshes are serialized by an async mutex that lookups never touch
//! - Tasks that queued behind a fetch share its outcome instead of fetching again
//! - A failed fetch is remembered for the refresh interval, even with no keys cached
//! - A refresh replaces the whole map, readers see either the old or new set

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use jsonwebtoken::jwk::{
    AlgorithmParameters, EllipticCurve, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse,
};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Errors raised while resolving signing keys.
#[derive(Debug, Error)]
pub enum KeySetError {
    #[error("no trusted key with id '{0}'")]
    UnknownKey(String),
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid identity provider URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("identity provider unavailable, last fetch failed: {0}")]
    Unavailable(String),
}

/// A single verification key.
pub struct TrustedKey {
    pub kid: String,
    pub algorithm: Algorithm,
    pub key: DecodingKey,
}

impl std::fmt::Debug for TrustedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

type KeyMap = HashMap<String, Arc<TrustedKey>>;

/// Where keys come from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Fixed keys supplied at construction; never refreshed.
    Static,
    /// A JWKS endpoint.
    JwksUri(Url),
    /// An issuer whose discovery document names the JWKS endpoint.
    Discovery(Url),
}

/// Outcome of the most recent fetch attempt.
#[derive(Debug, Default)]
struct RefreshState {
    last_attempt: Option<Instant>,
    last_error: Option<String>,
}

impl RefreshState {
    fn rejection(&self, kid: &str) -> KeySetError {
        match &self.last_error {
            Some(error) => KeySetError::Unavailable(error.clone()),
            None => KeySetError::UnknownKey(kid.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// The identity provider's signing keys, cached for the verifier's lifetime.
#[derive(Debug)]
pub struct TrustedKeySet {
    keys: ArcSwap<KeyMap>,
    source: KeySource,
    http: reqwest::Client,
    min_refresh_interval: Duration,
    refresh: Mutex<RefreshState>,
    /// Completed fetch attempts.
    attempts: AtomicU64,
}

impl TrustedKeySet {
    /// Build a fixed key set from a JWK set.
    pub fn from_jwk_set(set: &JwkSet) -> Self {
        Self {
            keys: ArcSwap::from_pointee(index_keys(set)),
            source: KeySource::Static,
            http: reqwest::Client::new(),
            min_refresh_interval: Duration::ZERO,
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Build an initially empty key set that fetches from `source` on demand.
    pub fn remote(source: KeySource, http: reqwest::Client, min_refresh_interval: Duration) -> Self {
        Self {
            keys: ArcSwap::from_pointee(KeyMap::new()),
            source,
            http,
            min_refresh_interval,
            refresh: Mutex::new(RefreshState::default()),
            attempts: AtomicU64::new(0),
        }
    }

    /// Number of keys currently trusted.
    pub fn len(&self) -> usize {
        self.keys.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a cached key without touching the network.
    pub fn get(&self, kid: &str) -> Option<Arc<TrustedKey>> {
        self.keys.load().get(kid).cloned()
    }

    /// Resolve a key, refreshing from the identity provider on a cache miss.
    pub async fn resolve(&self, kid: &str) -> Result<Arc<TrustedKey>, KeySetError> {
        if let Some(key) = self.get(kid) {
            return Ok(key);
        }
        if matches!(self.source, KeySource::Static) {
            return Err(KeySetError::UnknownKey(kid.to_string()));
        }

        let seen = self.attempts.load(Ordering::Acquire);
        let mut state = self.refresh.lock().await;
        if let Some(key) = self.get(kid) {
            return Ok(key);
        }
        // A fetch finished while we waited for the lock.
        if self.attempts.load(Ordering::Acquire) != seen {
            return Err(state.rejection(kid));
        }
        if let Some(at) = state.last_attempt {
            if at.elapsed() < self.min_refresh_interval {
                tracing::debug!(kid = %kid, "Key refresh throttled");
                return Err(state.rejection(kid));
            }
        }

        self.fetch_locked(&mut state).await?;

        self.get(kid)
            .ok_or_else(|| KeySetError::UnknownKey(kid.to_string()))
    }

    /// Fetch the key set now, replacing the cached keys.
    ///
    /// Returns the number of trusted keys after the refresh.
    pub async fn refresh(&self) -> Result<usize, KeySetError> {
        if matches!(self.source, KeySource::Static) {
            return Ok(self.len());
        }
        let mut state = self.refresh.lock().await;
        self.fetch_locked(&mut state).await
    }

    /// Drop all cached keys; the next lookup fetches again.
    pub async fn invalidate(&self) {
        if matches!(self.source, KeySource::Static) {
            return;
        }
        let mut state = self.refresh.lock().await;
        *state = RefreshState::default();
        self.keys.store(Arc::new(KeyMap::new()));
    }

    async fn fetch_locked(&self, state: &mut RefreshState) -> Result<usize, KeySetError> {
        state.last_attempt = Some(Instant::now());
        let result = self.fetch_and_swap().await;
        state.last_error = result.as_ref().err().map(|e| e.to_string());
        self.attempts.fetch_add(1, Ordering::Release);
        result
    }

    async fn fetch_and_swap(&self) -> Result<usize, KeySetError> {
        let jwks_uri = match &self.source {
            KeySource::Static => return Ok(self.len()),
            KeySource::JwksUri(uri) => uri.clone(),
            KeySource::Discovery(issuer) => self.discover_jwks_uri(issuer).await?,
        };

        let set: JwkSet = self
            .http
            .get(jwks_uri.clone())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let keys = index_keys(&set);
        let count = keys.len();
        self.keys.store(Arc::new(keys));

        tracing::info!(jwks_uri = %jwks_uri, keys = count, "Trusted key set refreshed");
        Ok(count)
    }

    async fn discover_jwks_uri(&self, issuer: &Url) -> Result<Url, KeySetError> {
        let discovery = discovery_url(issuer)?;
        let document: DiscoveryDocument = self
            .http
            .get(discovery)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Url::parse(&document.jwks_uri)?)
    }
}

/// `{issuer}/.well-known/openid-configuration`, keeping any issuer path.
pub fn discovery_url(issuer: &Url) -> Result<Url, url::ParseError> {
    let base = issuer.as_str().trim_end_matches('/');
    Url::parse(&format!("{base}/.well-known/openid-configuration"))
}

fn index_keys(set: &JwkSet) -> KeyMap {
    let mut keys = KeyMap::new();
    for jwk in &set.keys {
        match trusted_key(jwk) {
            Some(key) => {
                keys.insert(key.kid.clone(), Arc::new(key));
            }
            None => {
                tracing::debug!(kid = ?jwk.common.key_id, "Skipping JWK not usable for signatures");
            }
        }
    }
    keys
}

fn trusted_key(jwk: &Jwk) -> Option<TrustedKey> {
    let kid = jwk.common.key_id.clone()?;
    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        return None;
    }

    let algorithm = match &jwk.common.key_algorithm {
        Some(alg) => signing_algorithm(alg)?,
        None => default_algorithm(&jwk.algorithm)?,
    };
    if !algorithm_fits_key(algorithm, &jwk.algorithm) {
        return None;
    }

    let key = DecodingKey::from_jwk(jwk).ok()?;
    Some(TrustedKey {
        kid,
        algorithm,
        key,
    })
}

fn signing_algorithm(alg: &KeyAlgorithm) -> Option<Algorithm> {
    match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        // Symmetric and encryption algorithms are never trusted.
        _ => None,
    }
}

fn default_algorithm(params: &AlgorithmParameters) -> Option<Algorithm> {
    match params {
        AlgorithmParameters::RSA(_) => Some(Algorithm::RS256),
        AlgorithmParameters::EllipticCurve(ec) => match ec.curve {
            EllipticCurve::P256 => Some(Algorithm::ES256),
            EllipticCurve::P384 => Some(Algorithm::ES384),
            _ => None,
        },
        AlgorithmParameters::OctetKeyPair(_) => Some(Algorithm::EdDSA),
        _ => None,
    }
}

fn algorithm_fits_key(algorithm: Algorithm, params: &AlgorithmParameters) -> bool {
    match params {
        AlgorithmParameters::RSA(_) => matches!(
            algorithm,
            Algorithm::RS256
                | Algorithm::RS384
                | Algorithm::RS512
                | Algorithm::PS256
                | Algorithm::PS384
                | Algorithm::PS512
        ),
        AlgorithmParameters::EllipticCurve(_) => {
            matches!(algorithm, Algorithm::ES256 | Algorithm::ES384)
        }
        AlgorithmParameters::OctetKeyPair(_) => algorithm == Algorithm::EdDSA,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRUSTED_JWKS: &str = include_str!("../../tests/fixtures/trusted_jwks.json");

    fn trusted_set() -> JwkSet {
        serde_json::from_str(TRUSTED_JWKS).unwrap()
    }

    #[tokio::test]
    async fn test_static_set_resolves_known_kid() {
        let keys = TrustedKeySet::from_jwk_set(&trusted_set());
        assert_eq!(keys.len(), 1);

        let key = keys.resolve("test-kid").await.unwrap();
        assert_eq!(key.algorithm, Algorithm::RS256);
        assert!(matches!(
            keys.resolve("missing").await,
            Err(KeySetError::UnknownKey(kid)) if kid == "missing"
        ));
    }

    #[test]
    fn test_encryption_and_symmetric_keys_are_skipped() {
        let mut set = trusted_set();
        let mut enc = set.keys[0].clone();
        enc.common.key_id = Some("enc-kid".into());
        enc.common.public_key_use = Some(PublicKeyUse::Encryption);
        set.keys.push(enc);

        let oct: Jwk = serde_json::from_value(serde_json::json!({
            "kty": "oct",
            "kid": "hmac-kid",
            "alg": "HS256",
            "k": "c2VjcmV0"
        }))
        .unwrap();
        set.keys.push(oct);

        let keys = TrustedKeySet::from_jwk_set(&set);
        assert_eq!(keys.len(), 1);
        assert!(keys.get("enc-kid").is_none());
        assert!(keys.get("hmac-kid").is_none());
    }

    #[test]
    fn test_key_without_kid_is_skipped() {
        let mut set = trusted_set();
        set.keys[0].common.key_id = None;
        assert!(TrustedKeySet::from_jwk_set(&set).is_empty());
    }

    /// Accepts connections and never answers. Returns the address and the accept count.
    async fn silent_endpoint() -> (std::net::SocketAddr, Arc<std::sync::atomic::AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                held.push(socket);
            }
        });
        (addr, accepted)
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_failed_fetch() {
        let (addr, accepted) = silent_endpoint().await;
        let jwks_uri = Url::parse(&format!("http://{addr}/certs")).unwrap();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(300))
            .no_proxy()
            .build()
            .unwrap();
        let keys = Arc::new(TrustedKeySet::remote(
            KeySource::JwksUri(jwks_uri),
            http,
            Duration::from_secs(30),
        ));

        let started = Instant::now();
        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..6 {
            let keys = keys.clone();
            tasks.spawn(async move { keys.resolve("test-kid").await });
        }
        while let Some(result) = tasks.join_next().await {
            assert!(matches!(result.unwrap(), Err(KeySetError::Unavailable(_))));
        }
        assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        // The failure is remembered; no new fetch inside the refresh interval.
        let started = Instant::now();
        assert!(matches!(
            keys.resolve("test-kid").await,
            Err(KeySetError::Unavailable(_))
        ));
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discovery_url_keeps_issuer_path() {
        let issuer = Url::parse("http://idp.local:8080/realms/veer/").unwrap();
        assert_eq!(
            discovery_url(&issuer).unwrap().as_str(),
            "http://idp.local:8080/realms/veer/.well-known/openid-configuration"
        );
    }
}
