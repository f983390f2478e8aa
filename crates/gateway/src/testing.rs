//! Test utilities for the gateway - scripted upstreams and in-process servers
//!
//! Integration tests need real sockets: chunk boundaries, aborted bodies and
//! caller disconnects only show up over an actual connection. These helpers
//! bind everything to `127.0.0.1:0` and return the chosen address.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::Json,
    http::Uri,
    response::{IntoResponse, Response},
    routing::post,
};
use futures::stream::{self, Stream, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::config::{Config, ServicesConfig};
use crate::error::Result;
use crate::proxy::{AppState, create_router};

/// Raw request targets seen by a recording upstream, in arrival order
pub type RequestLog = Arc<Mutex<Vec<String>>>;

/// How a scripted upstream body ends after its last chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptEnd {
    /// Close the body cleanly
    Close,
    /// Abort the connection mid-body
    Fail,
    /// Keep the connection open without sending anything else
    Hang,
}

/// A canned streaming response: chunks with a pause before each one
#[derive(Debug, Clone)]
pub struct StreamScript {
    pub chunks: Vec<Bytes>,
    pub delay: Duration,
    pub end: ScriptEnd,
}

impl StreamScript {
    pub fn new<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            delay: Duration::from_millis(50),
            end: ScriptEnd::Close,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ending(mut self, end: ScriptEnd) -> Self {
        self.end = end;
        self
    }

    /// Body stream that plays the script
    pub fn into_stream(self) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
        let delay = self.delay;
        let end = self.end;

        let chunks = stream::iter(self.chunks).then(move |chunk| async move {
            tokio::time::sleep(delay).await;
            Ok::<_, std::io::Error>(chunk)
        });

        let tail = stream::once(async move {
            tokio::time::sleep(delay).await;
            end
        })
        .filter_map(|end| async move {
            match end {
                ScriptEnd::Close => None,
                ScriptEnd::Fail => Some(Err(std::io::Error::other("scripted upstream failure"))),
                ScriptEnd::Hang => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        });

        chunks.chain(tail)
    }
}

/// Serve `router` on an ephemeral local port
pub async fn serve_router(router: Router) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::warn!("Test server stopped: {e}");
        }
    });
    Ok(addr)
}

/// Chatbot-style upstream that answers `POST /api/chat` with `script`
pub async fn spawn_scripted_upstream(script: StreamScript) -> std::io::Result<SocketAddr> {
    let script = Arc::new(script);
    let router = Router::new().route(
        "/api/chat",
        post(move || {
            let script = StreamScript::clone(&script);
            async move { streamed_text(script.into_stream()) }
        }),
    );
    serve_router(router).await
}

/// Chatbot-style upstream that streams `{"message": ...}` back one
/// character per chunk
pub async fn spawn_echo_upstream(delay: Duration) -> std::io::Result<SocketAddr> {
    let router = Router::new().route(
        "/api/chat",
        post(move |Json(body): Json<serde_json::Value>| async move {
            let message = body
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            let chunks: Vec<String> = message.chars().map(String::from).collect();
            streamed_text(StreamScript::new(chunks).delay(delay).into_stream())
        }),
    );
    serve_router(router).await
}

/// Upstream that answers every request with `200 ok` and records the raw
/// request target (path and query) exactly as it arrived on the wire
pub async fn spawn_recording_upstream() -> std::io::Result<(SocketAddr, RequestLog)> {
    let log = RequestLog::default();
    let recorder = Arc::clone(&log);
    let router = Router::new().fallback(move |uri: Uri| {
        let log = Arc::clone(&recorder);
        async move {
            log.lock().await.push(uri.to_string());
            "ok"
        }
    });
    let addr = serve_router(router).await?;
    Ok((addr, log))
}

fn streamed_text<S>(body: S) -> Response
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
{
    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response()
}

/// An address nothing is listening on
pub fn unused_addr() -> std::io::Result<SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    listener.local_addr()
}

/// Gateway config pointing at the given backends, bound to localhost
pub fn gateway_config(user_service_url: &str, chatbot_service_url: &str) -> Config {
    let mut config = Config {
        services: ServicesConfig {
            user_service_url: Some(user_service_url.to_string()),
            chatbot_service_url: Some(chatbot_service_url.to_string()),
        },
        ..Config::default()
    };
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config
}

/// Start a gateway for `config` on an ephemeral port
pub async fn spawn_gateway(config: &Config) -> Result<SocketAddr> {
    config.validate()?;
    let state = Arc::new(AppState::from_config(config)?);
    Ok(serve_router(create_router(state)).await?)
}
