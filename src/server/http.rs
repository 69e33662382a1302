//! HTTP control and streaming surface
//!
//! Routes:
//! - `GET /` - viewer page
//! - `GET /video_feed` - MJPEG stream, one consumer loop per request
//! - `GET /events` - SSE stream of `frame` events, one consumer loop per request
//! - `POST /start_stream`, `POST /stop_stream` - session control
//! - `GET /status`, `GET /network_status`, `GET /debug_info` - diagnostics
//! - `GET /cors-test` - echoes how the CORS policy treats the caller
//!
//! Handlers only call public coordinator operations. A disconnecting client
//! drops its response body, which detaches its consumer.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures::Stream;
use serde_json::json;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::codec::{self, mjpeg, Encoded};
use crate::consumer::ConsumerHandle;
use crate::coordinator::StreamCoordinator;
use crate::error::{Error, Result};

use super::config::ServerConfig;
use super::cors::CorsPolicy;

const NO_CACHE: &str = "no-cache, no-store, must-revalidate";

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><title>Pi Camera Stream</title></head>
<body style="background:#111;color:#eee;font-family:sans-serif;text-align:center">
<h1>Pi Camera Stream</h1>
<img src="/video_feed" alt="camera" style="max-width:100%">
<p>
<button onclick="fetch('/start_stream',{method:'POST'}).then(()=>location.reload())">Start</button>
<button onclick="fetch('/stop_stream',{method:'POST'}).then(()=>location.reload())">Stop</button>
</p>
</body>
</html>
"#;

/// Shared handler state
#[derive(Clone)]
struct AppState {
    coordinator: StreamCoordinator,
    placeholder: Bytes,
    keep_alive: Duration,
    cors: Arc<CorsPolicy>,
}

/// Build the router for `coordinator`
pub fn router(coordinator: StreamCoordinator, config: &ServerConfig) -> Result<Router> {
    let (width, height) = config.placeholder_size;
    let placeholder = codec::placeholder_jpeg(width, height, config.placeholder_quality)?;

    let state = AppState {
        coordinator,
        placeholder,
        keep_alive: config.sse_keep_alive,
        cors: Arc::new(config.cors.clone()),
    };

    Ok(Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .route("/events", get(events))
        .route("/start_stream", post(start_stream))
        .route("/stop_stream", post(stop_stream))
        .route("/status", get(status))
        .route("/network_status", get(network_status))
        .route("/debug_info", get(debug_info))
        .route("/cors-test", get(cors_test))
        .layer(middleware::from_fn(log_request))
        .layer(config.cors.layer())
        .with_state(state))
}

/// Detaches a web consumer when its response body is dropped
struct DetachOnDrop {
    coordinator: StreamCoordinator,
    handle: ConsumerHandle,
}

impl Drop for DetachOnDrop {
    fn drop(&mut self) {
        // The loop stops at its next boundary even if the detach task never runs
        self.handle.cancel();

        let coordinator = self.coordinator.clone();
        let handle = self.handle.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                coordinator.detach_consumer(&handle).await;
            });
        }
    }
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({ "status": "error", "message": message.to_string() })),
    )
        .into_response()
}

fn placeholder_response(placeholder: Bytes) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [
            (header::CONTENT_TYPE, "image/jpeg"),
            (header::CACHE_CONTROL, NO_CACHE),
        ],
        placeholder,
    )
        .into_response()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /video_feed
async fn video_feed(State(state): State<AppState>) -> Response {
    let attachment = match state.coordinator.attach_stream_consumer().await {
        Ok(attachment) => attachment,
        Err(Error::NotStreaming) => return placeholder_response(state.placeholder),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    let guard = DetachOnDrop {
        coordinator: state.coordinator.clone(),
        handle: attachment.handle,
    };

    // The closure owns the guard, so it drops with the body
    let stream = ReceiverStream::new(attachment.frames).filter_map(move |frame| {
        let _ = &guard;
        match frame {
            Encoded::MjpegPart(part) => Some(Ok::<Bytes, Infallible>(part)),
            _ => None,
        }
    });

    (
        [
            (header::CONTENT_TYPE, mjpeg::content_type()),
            (header::CACHE_CONTROL, NO_CACHE.to_string()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
            (header::HeaderName::from_static("x-accel-buffering"), "no".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// GET /events
async fn events(State(state): State<AppState>) -> Response {
    let attachment = match state.coordinator.attach_event_consumer().await {
        Ok(attachment) => attachment,
        Err(e @ Error::NotStreaming) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e),
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    };

    Sse::new(frame_events(
        DetachOnDrop {
            coordinator: state.coordinator.clone(),
            handle: attachment.handle,
        },
        attachment.frames,
    ))
    .keep_alive(KeepAlive::new().interval(state.keep_alive).text("keepalive"))
    .into_response()
}

fn frame_events(
    guard: DetachOnDrop,
    mut frames: tokio::sync::mpsc::Receiver<Encoded>,
) -> impl Stream<Item = std::result::Result<Event, Infallible>> {
    async_stream::stream! {
        let _guard = guard;
        while let Some(frame) = frames.recv().await {
            let Encoded::Event(payload) = frame else {
                continue;
            };
            match Event::default()
                .event("frame")
                .id(payload.sequence.to_string())
                .json_data(&payload)
            {
                Ok(event) => yield Ok(event),
                Err(e) => tracing::debug!(error = %e, "Dropping unserializable event"),
            }
        }
    }
}

/// POST /start_stream
async fn start_stream(State(state): State<AppState>) -> Response {
    match state.coordinator.start().await {
        Ok(status) => Json(json!({
            "status": "success",
            "message": "Stream started",
            "state": status,
        }))
        .into_response(),
        Err(e @ Error::DeviceUnavailable(_)) => error_response(StatusCode::SERVICE_UNAVAILABLE, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// POST /stop_stream
async fn stop_stream(State(state): State<AppState>) -> Response {
    match state.coordinator.stop().await {
        Ok(status) => Json(json!({
            "status": "success",
            "message": "Stream stopped",
            "state": status,
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// GET /status
async fn status(State(state): State<AppState>) -> Response {
    Json(state.coordinator.status()).into_response()
}

/// GET /network_status
async fn network_status(State(state): State<AppState>) -> Response {
    Json(state.coordinator.network_status()).into_response()
}

/// GET /debug_info
async fn debug_info(State(state): State<AppState>) -> Response {
    let coordinator = &state.coordinator;
    let status = coordinator.status();
    let session = coordinator.session_info().await;

    Json(json!({
        "status": status,
        "session": session,
        "consumers": status.consumers,
        "last_start_error": coordinator.last_start_error(),
        "network": coordinator.network_status(),
        "display_enabled": coordinator.config().display_enabled,
    }))
    .into_response()
}

/// GET /cors-test
async fn cors_test(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(json!({
        "message": "CORS test successful!",
        "allowed": state.cors.allows(origin.as_deref()),
        "origin": origin,
        "allowed_origins": state.cors.allowed_origins,
        "allowed_suffixes": state.cors.allowed_suffixes,
    }))
    .into_response()
}

async fn log_request(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_secs_f64() * 1000.0,
        "HTTP request"
    );

    response
}
