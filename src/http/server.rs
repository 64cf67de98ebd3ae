//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Compile the route table and token verifier from configuration
//! - Create the Axum Router (health endpoint + catch-all pipeline handler)
//! - Wire up middleware (request ID, tracing, body limit)
//! - Serve plain HTTP or TLS until the shutdown signal fires

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer, request_id::SetRequestIdLayer, trace::TraceLayer,
};

use crate::auth::{verifier_from_config, KeySetError, TokenVerifier};
use crate::config::schema::{AuthPolicy, GatewayConfig, TlsConfig};
use crate::http::pipeline::Pipeline;
use crate::http::proxy::UpstreamClient;
use crate::http::request::MakeRequestUuid;
use crate::routing::{RouteError, RouteTable};

/// How long in-flight TLS connections may drain after shutdown is requested.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while building or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("token verifier: {0}")]
    KeySet(#[from] KeySetError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// The gateway's HTTP front end.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    pipeline: Arc<Pipeline>,
    verifier: Option<Arc<TokenVerifier>>,
}

impl GatewayServer {
    /// Create a server from validated configuration.
    ///
    /// No network I/O happens here; keys are fetched on first use or by
    /// [`GatewayServer::warm_up`].
    pub fn new(config: GatewayConfig) -> Result<Self, ServerError> {
        let routes = Arc::new(RouteTable::from_config(&config.routes)?);

        let needs_auth = routes
            .routes()
            .iter()
            .any(|r| r.auth == AuthPolicy::Authenticated);
        // Without an issuer, authenticated routes fail closed with 401.
        let verifier = if config.auth.issuer.trim().is_empty() {
            if needs_auth {
                tracing::warn!("Authenticated routes configured without auth.issuer; they reject every request");
            }
            None
        } else {
            Some(Arc::new(verifier_from_config(&config.auth, &config.timeouts)?))
        };

        let scheme = if config.listener.tls.is_some() {
            "https"
        } else {
            "http"
        };
        let pipeline = Pipeline::new(
            routes,
            verifier.clone(),
            UpstreamClient::new(&config.timeouts),
        )
        .with_forwarded_headers(config.security.forwarded_headers)
        .with_scheme(scheme);

        Ok(Self::from_parts(config, Arc::new(pipeline), verifier))
    }

    /// Assemble a server around an existing pipeline.
    pub fn from_parts(
        config: GatewayConfig,
        pipeline: Arc<Pipeline>,
        verifier: Option<Arc<TokenVerifier>>,
    ) -> Self {
        let router = Self::build_router(&config, pipeline.clone());
        Self {
            router,
            config,
            pipeline,
            verifier,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, pipeline: Arc<Pipeline>) -> Router {
        let mut router = Router::new();
        if !config.listener.health_path.is_empty() {
            router = router.route(&config.listener.health_path, get(health_handler));
        }

        router
            .fallback(proxy_handler)
            .with_state(AppState { pipeline })
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Fetch the identity provider's keys ahead of the first request.
    ///
    /// Failure is not fatal: keys are fetched again on demand.
    pub async fn warm_up(&self) {
        let Some(verifier) = &self.verifier else {
            return;
        };
        match verifier.keys().refresh().await {
            Ok(count) => tracing::info!(keys = count, "Trusted key set loaded"),
            Err(e) => tracing::warn!(
                error = %e,
                "Trusted key set unavailable at startup, will retry on first request"
            ),
        }
    }

    /// The router, for in-process testing with `tower::ServiceExt::oneshot`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.pipeline.routes().len(),
            "HTTP server starting"
        );

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS termination.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: &TlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        tracing::info!(
            address = %addr,
            routes = self.pipeline.routes().len(),
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            signal.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        axum_server::bind_rustls(addr, rustls)
            .handle(handle)
            .serve(app)
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<RustlsConfig, std::io::Error> {
    for (kind, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{kind} file not found: {}", path.display()),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Liveness of the gateway process itself; upstreams are not probed.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "UP" }))
}

/// Every request that is not the health check goes through the pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.pipeline.handle(request).await
}
