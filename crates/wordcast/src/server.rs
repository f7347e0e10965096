//! HTTP server and routes
//!
//! Implements the axum server with the status, health, full-text and
//! event-stream routes. All routes read the text source independently; the
//! event stream hands each connection its own pacing task.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use wordcast_core::TextSource;

use crate::emitter::{self, FRAME_CHANNEL_CAPACITY, StreamSession};

/// Content type of the full-text and status routes
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Content type of the event-stream route
const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Shared state handed to every route
#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn TextSource>,
    word_interval: Duration,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        source: Arc<dyn TextSource>,
        word_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            word_interval,
            shutdown,
        }
    }
}

/// Response payload for /health
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

/// Build the status text served on `/`
fn status_text(word_interval: Duration) -> String {
    format!(
        "ok\n\
         GET /sse    -> event stream (one word per {}ms)\n\
         GET /text   -> full text\n\
         GET /health -> liveness\n",
        word_interval.as_millis()
    )
}

async fn index_handler(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        status_text(state.word_interval),
    )
        .into_response()
}

async fn health_handler() -> Response {
    axum::Json(HealthResponse { ok: true }).into_response()
}

/// Plain-text 500 for an unreadable source
fn source_unavailable() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
        "failed to read text source",
    )
        .into_response()
}

/// Handle GET /text: the raw source text, untouched
async fn text_handler(State(state): State<AppState>) -> Response {
    match state.source.load().await {
        Ok(document) => (
            [(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)],
            document.raw().to_string(),
        )
            .into_response(),
        Err(e) => {
            error!("text source unavailable: {}", e);
            source_unavailable()
        }
    }
}

/// Handle GET /sse: one paced session per connection
async fn sse_handler(State(state): State<AppState>) -> Response {
    let document = match state.source.load().await {
        Ok(document) => document,
        Err(e) => {
            error!("text source unavailable: {}", e);
            return source_unavailable();
        }
    };

    let session = StreamSession::new(document.into_tokens());
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let interval = state.word_interval;
    let shutdown = state.shutdown.child_token();

    tokio::spawn(async move {
        let outcome = emitter::run_session(session, tx, interval, shutdown).await;
        debug!(?outcome, "stream session ended");
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, std::io::Error>));

    info!("event stream opened");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

/// Build the axum application router
///
/// Separated from `run_server` to enable testing without TCP binding.
pub(crate) fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/text", get(text_handler))
        .route("/sse", get(sse_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP server on an already-bound listener
///
/// Returns once `shutdown` fires and in-flight requests have drained. Open
/// event streams observe the same token and close themselves.
pub async fn run_server(
    listener: TcpListener,
    state: AppState,
) -> Result<(), std::io::Error> {
    let shutdown = state.shutdown.clone();
    let app = build_app(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
