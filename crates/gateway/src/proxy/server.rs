//! HTTP gateway server
//!
//! Implements the gateway front door:
//! - Prefix routing through the [`RouteTable`] with path rewriting
//! - Bearer credential propagation to the selected backend
//! - Live streaming of upstream bodies through the [`StreamRelay`]
//! - A local `/health` endpoint with stream counters, and browser CORS handling
//!
//! Upstream requests go out through a hyper client so the rewritten request
//! target is sent byte for byte.

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
};
use http_body_util::{BodyExt, Full, LengthLimitError};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::auth::AuthContext;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::relay::{RelayHandle, RelayState, StreamRelay};
use crate::routes::RouteTable;

use super::error::ProxyError;

/// Hop-by-hop headers that are never forwarded in either direction
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "te",
    "trailer",
    "upgrade",
];

/// HTTP client used for upstream requests
pub type UpstreamClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Counters for relayed response bodies
#[derive(Debug, Default)]
pub struct StreamStats {
    active: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl StreamStats {
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn finished(&self, state: RelayState) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        match state {
            RelayState::Completed => self.completed.fetch_add(1, Ordering::Relaxed),
            _ => self.failed.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "active": self.active(),
            "completed": self.completed(),
            "failed": self.failed(),
        })
    }
}

/// Shared state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Route rules, immutable after startup
    pub routes: Arc<RouteTable>,
    /// HTTP client for upstream requests
    pub client: UpstreamClient,
    /// Relay settings applied to every streamed response
    pub relay: StreamRelay,
    /// Largest inbound body forwarded upstream
    pub max_body_bytes: usize,
    /// Allowed browser origin; `None` allows any origin
    pub cors_origin: Option<HeaderValue>,
    /// Outcome counters for relayed bodies
    pub streams: Arc<StreamStats>,
}

impl AppState {
    /// Build the state from a validated configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let routes = RouteTable::from_services(&config.services)?;

        let client = upstream_client(config.proxy.connect_timeout());

        let cors_origin = match config.server.cors_origin.trim() {
            "*" => None,
            origin => Some(HeaderValue::from_str(origin).map_err(|e| {
                GatewayError::Config(format!("Invalid cors_origin '{origin}': {e}"))
            })?),
        };

        Ok(Self {
            routes: Arc::new(routes),
            client,
            relay: StreamRelay::new(
                config.proxy.relay_buffer_chunks,
                config.proxy.idle_timeout(),
            ),
            max_body_bytes: config.proxy.max_body_bytes,
            cors_origin,
            streams: Arc::new(StreamStats::default()),
        })
    }
}

/// Pooled HTTP/1 client for plain and TLS backends. Redirects are not followed.
fn upstream_client(connect_timeout: Duration) -> UpstreamClient {
    let mut http = HttpConnector::new();
    http.set_connect_timeout(Some(connect_timeout));
    http.enforce_http(false);

    let https = HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .wrap_connector(http);

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(90))
        .build(https)
}

/// The gateway server
pub struct GatewayServer {
    addr: SocketAddr,
    state: Arc<AppState>,
}

impl GatewayServer {
    /// Validate the configuration and prepare the server.
    ///
    /// Nothing is bound yet; a configuration error here means no listener is
    /// ever opened.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        let addr = config.listen_addr()?;
        let state = Arc::new(AppState::from_config(config)?);
        Ok(Self { addr, state })
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Bind the listener and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let app = create_router(self.state());

        tracing::info!("Gateway service listening on {}", self.addr);
        for rule in self.state.routes.rules() {
            tracing::info!(
                "Proxying {} to {} (rewritten to {})",
                rule.prefix(),
                rule.target(),
                rule.replacement()
            );
        }
        match &self.state.cors_origin {
            Some(origin) => tracing::info!("CORS origin: {origin:?}"),
            None => tracing::info!("CORS origin: any"),
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|e| GatewayError::Proxy(format!("Failed to bind to {}: {e}", self.addr)))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| GatewayError::Proxy(format!("Server error: {e}")))?;

        tracing::info!("Gateway shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes and layers configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(state.cors_origin.clone());

    Router::new()
        .route("/health", get(health_handler))
        .fallback(proxy_handler)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origin: Option<HeaderValue>) -> CorsLayer {
    let allow_origin = match origin {
        Some(origin) => AllowOrigin::exact(origin),
        None => AllowOrigin::any(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::PUT,
            Method::PATCH,
            Method::POST,
            Method::DELETE,
        ])
        .allow_headers(AllowHeaders::mirror_request())
}

/// Health check endpoint - returns JSON status and stream counters
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "streams": state.streams.to_json(),
    }))
}

/// Route, rewrite and forward every request that is not handled locally
async fn proxy_handler(State(state): State<Arc<AppState>>, request: Request<Body>) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match forward_request(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            if e.is_client_error() {
                tracing::debug!(%method, %path, category = e.category(), "{e}");
            } else {
                tracing::warn!(%method, %path, category = e.category(), "{e}");
            }
            e.into_response()
        }
    }
}

/// Forward one request to the backend its path resolves to.
///
/// Every failure returned from here happens before any response bytes are
/// written to the caller. Once the upstream status arrives, the body is handed
/// to the relay and later failures abort the stream instead.
pub async fn forward_request(
    state: &AppState,
    request: Request<Body>,
) -> std::result::Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();

    let rule = state
        .routes
        .resolve(path)
        .ok_or_else(|| ProxyError::RouteNotFound {
            path: path.to_string(),
        })?;

    let target_uri = rule
        .upstream_uri(path, parts.uri.query())
        .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?;

    let auth = AuthContext::from_headers(&parts.headers);
    let mut headers = strip_hop_by_hop(&parts.headers);
    auth.attach_headers(&mut headers);

    let body_bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|e| {
            if e.into_inner().is::<LengthLimitError>() {
                ProxyError::PayloadTooLarge {
                    limit: state.max_body_bytes,
                }
            } else {
                ProxyError::InvalidRequest("Failed to read request body".to_string())
            }
        })?;

    tracing::debug!(
        method = %parts.method,
        path,
        route = rule.prefix(),
        upstream = %target_uri,
        authenticated = auth.is_authenticated(),
        "Forwarding request"
    );

    let mut upstream_request = axum::http::Request::builder()
        .method(parts.method.clone())
        .uri(target_uri.clone())
        .body(Full::new(body_bytes))
        .map_err(|e| ProxyError::InvalidRequest(format!("Failed to build upstream request: {e}")))?;
    *upstream_request.headers_mut() = headers;

    let idle_timeout = state.relay.idle_timeout();
    let upstream = tokio::time::timeout(idle_timeout, state.client.request(upstream_request))
        .await
        .map_err(|_| {
            ProxyError::UpstreamUnavailable(format!(
                "No response from {} within {}s",
                rule.target(),
                idle_timeout.as_secs()
            ))
        })?
        .map_err(|e| classify_upstream_error(&e))?;

    let status = upstream.status();
    let response_headers = strip_hop_by_hop(upstream.headers());

    tracing::info!(
        method = %parts.method,
        path,
        upstream = %target_uri,
        status = status.as_u16(),
        "Proxied request"
    );

    let (body, handle) = state.relay.spawn(upstream.into_body().into_data_stream());
    track_stream(&state.streams, handle, parts.method.to_string(), path.to_string());

    let mut response = Body::from_stream(body).into_response();
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    Ok(response)
}

/// Count the stream and log its final state once the relay finishes
fn track_stream(stats: &Arc<StreamStats>, handle: RelayHandle, method: String, path: String) {
    stats.started();
    let stats = Arc::clone(stats);
    let task = async move {
        let outcome = handle.finished().await;
        stats.finished(outcome);
        tracing::info!(%method, %path, state = ?outcome, "Stream finished");
    };
    tokio::spawn(task.in_current_span());
}

fn classify_upstream_error(e: &hyper_util::client::legacy::Error) -> ProxyError {
    if e.is_connect() {
        ProxyError::UpstreamUnavailable(format!("Failed to connect to upstream: {e}"))
    } else {
        ProxyError::UpstreamUnavailable(format!("Request failed: {e}"))
    }
}

/// Copy a header map without hop-by-hop headers
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut forwarded = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            forwarded.append(name.clone(), value.clone());
        }
    }
    forwarded
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
