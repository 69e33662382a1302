//! HTTP surface end-to-end tests
//!
//! Serves the real router on a loopback listener and drives it with a plain
//! HTTP client: session control, MJPEG and SSE streaming, diagnostics and
//! the CORS allow-list.
//!
//! Run: `cargo test --test http_e2e`

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use picam_stream::consumer::{ConsumerKind, LoopProfile};
use picam_stream::device::{HeadlessDisplay, SyntheticSource};
use picam_stream::server::CorsPolicy;
use picam_stream::{CoordinatorConfig, HttpServer, ServerConfig, StreamCoordinator};

// ── Shared helpers ───────────────────────────────────────────────────

struct TestServer {
    base: String,
    coordinator: StreamCoordinator,
    source: Arc<SyntheticSource>,
    shutdown: CancellationToken,
    task: tokio::task::JoinHandle<picam_stream::Result<()>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn shutdown(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server did not shut down")
            .unwrap()
            .unwrap();
    }
}

fn fast_config() -> CoordinatorConfig {
    CoordinatorConfig::default()
        .profile(
            ConsumerKind::Display,
            LoopProfile::display().interval(Duration::from_millis(5)),
        )
        .profile(
            ConsumerKind::Stream,
            LoopProfile::stream().interval(Duration::from_millis(5)),
        )
        .profile(
            ConsumerKind::Event,
            LoopProfile::event().sink_ready(Duration::from_millis(5)),
        )
}

async fn start_server() -> TestServer {
    let source = Arc::new(SyntheticSource::new(64, 48));
    let display = Arc::new(HeadlessDisplay::new(128, 128));
    let coordinator = StreamCoordinator::new(source.clone(), display, fast_config());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();

    let config = ServerConfig::with_addr(addr)
        .cors(CorsPolicy::deny_all().allow_origin("http://allowed.test").allow_suffix(".lovable.app"))
        .placeholder_size(32, 24);
    let server = HttpServer::new(config, coordinator.clone());

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let task = tokio::spawn(async move {
        server
            .serve_until(listener, async move { token.cancelled().await })
            .await
    });

    TestServer {
        base: format!("http://{addr}"),
        coordinator,
        source,
        shutdown,
        task,
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn get_json(client: &reqwest::Client, url: &str) -> Value {
    let resp = client.get(url).send().await.unwrap();
    assert_eq!(resp.status(), 200, "GET {url}");
    resp.json().await.unwrap()
}

/// Read body chunks until `needle` shows up; fails the test after two seconds
async fn read_until(resp: &mut reqwest::Response, needle: &[u8]) -> Vec<u8> {
    tokio::time::timeout(Duration::from_secs(2), async {
        let mut buf = Vec::new();
        while let Some(chunk) = resp.chunk().await.unwrap() {
            buf.extend_from_slice(&chunk);
            if buf.windows(needle.len()).any(|w| w == needle) {
                return buf;
            }
        }
        panic!("body ended before {:?}", String::from_utf8_lossy(needle));
    })
    .await
    .expect("timed out reading body")
}

async fn wait_for_clients(client: &reqwest::Client, server: &TestServer, expected: u64) {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let status = get_json(client, &server.url("/status")).await;
            if status["active_clients"].as_u64() == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("active_clients never reached {expected}"));
}

// ── Control and diagnostics ──────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn idle_status_has_stable_fields() {
    let server = start_server().await;
    let client = client();

    let status = get_json(&client, &server.url("/status")).await;
    let obj = status.as_object().unwrap();
    let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        [
            "active_clients",
            "lcd_streaming",
            "network_failed_checks",
            "network_stable",
            "streaming",
            "web_streaming",
        ]
    );
    assert_eq!(status["streaming"], false);
    assert_eq!(status["active_clients"], 0);
    assert_eq!(status["network_stable"], true);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_and_stop_over_http() {
    let server = start_server().await;
    let client = client();

    let resp = client.post(server.url("/start_stream")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Stream started");
    assert_eq!(body["state"]["streaming"], true);

    // Second start is a no-op
    let resp = client.post(server.url("/start_stream")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(server.source.acquire_count(), 1);

    let resp = client.post(server.url("/stop_stream")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Stream stopped");
    assert_eq!(body["state"]["streaming"], false);
    assert_eq!(server.source.release_count(), 1);

    // Stop while idle succeeds too
    let resp = client.post(server.url("/stop_stream")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(server.source.release_count(), 1);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn start_fails_when_device_unavailable() {
    let server = start_server().await;
    let client = client();
    server.source.set_available(false);

    let resp = client.post(server.url("/start_stream")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert!(!body["message"].as_str().unwrap().is_empty());
    assert!(!server.coordinator.is_streaming());

    let debug = get_json(&client, &server.url("/debug_info")).await;
    assert!(debug["last_start_error"].is_string());
    assert!(debug["session"].is_null());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn network_status_and_debug_info() {
    let server = start_server().await;
    let client = client();

    let network = get_json(&client, &server.url("/network_status")).await;
    assert_eq!(network["network_stable"], true);
    assert_eq!(network["failed_checks"], 0);
    assert_eq!(network["max_failed_checks"], 3);
    assert!(network["total_checks"].is_u64());

    client.post(server.url("/start_stream")).send().await.unwrap();

    let debug = get_json(&client, &server.url("/debug_info")).await;
    assert_eq!(debug["status"]["streaming"], true);
    assert!(debug["session"].is_object());
    assert_eq!(debug["display_enabled"], true);
    assert!(debug["network"].is_object());
    assert!(debug["last_start_error"].is_null());

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn index_page_embeds_the_feed() {
    let server = start_server().await;
    let client = client();

    let resp = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let html = resp.text().await.unwrap();
    assert!(html.contains("/video_feed"));

    server.shutdown().await;
}

// ── Streaming ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn idle_video_feed_serves_placeholder() {
    let server = start_server().await;
    let client = client();

    let resp = client.get(server.url("/video_feed")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");
    let body = resp.bytes().await.unwrap();
    assert_eq!(&body[..2], &[0xFF, 0xD8]);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn video_feed_streams_and_detaches_on_disconnect() {
    let server = start_server().await;
    let client = client();
    client.post(server.url("/start_stream")).send().await.unwrap();

    let mut resp = client.get(server.url("/video_feed")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert!(resp.headers()["cache-control"]
        .to_str()
        .unwrap()
        .contains("no-cache"));

    let body = read_until(&mut resp, b"--frame").await;
    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("Content-Type: image/jpeg"));

    wait_for_clients(&client, &server, 1).await;

    drop(resp);
    wait_for_clients(&client, &server, 0).await;

    // The session outlives its last web client
    let status = get_json(&client, &server.url("/status")).await;
    assert_eq!(status["streaming"], true);
    assert_eq!(status["lcd_streaming"], true);
    assert_eq!(server.source.release_count(), 0);

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn events_stream_frames() {
    let server = start_server().await;
    let client = client();
    client.post(server.url("/start_stream")).send().await.unwrap();

    let mut resp = client.get(server.url("/events")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = read_until(&mut resp, b"data:image/jpeg;base64,").await;
    let body = String::from_utf8_lossy(&body);
    assert!(body.lines().any(|l| l.starts_with("event:") && l.ends_with("frame")));

    drop(resp);
    wait_for_clients(&client, &server, 0).await;

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_events_are_refused() {
    let server = start_server().await;
    let client = client();

    let resp = client.get(server.url("/events")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_ends_open_streams() {
    let server = start_server().await;
    let client = client();
    client.post(server.url("/start_stream")).send().await.unwrap();

    let mut resp = client.get(server.url("/video_feed")).send().await.unwrap();
    read_until(&mut resp, b"--frame").await;

    client.post(server.url("/stop_stream")).send().await.unwrap();

    // Body drains to EOF once the consumer loop is gone
    tokio::time::timeout(Duration::from_secs(2), async {
        while resp.chunk().await.unwrap().is_some() {}
    })
    .await
    .expect("stream body did not end after stop");

    assert_eq!(server.source.release_count(), 1);
    server.shutdown().await;
}

// ── CORS ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn cors_allow_list() {
    let server = start_server().await;
    let client = client();

    let resp = client
        .get(server.url("/status"))
        .header("Origin", "http://allowed.test")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "http://allowed.test"
    );

    let resp = client
        .get(server.url("/status"))
        .header("Origin", "https://preview.lovable.app")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()["access-control-allow-origin"],
        "https://preview.lovable.app"
    );

    let resp = client
        .get(server.url("/status"))
        .header("Origin", "http://evil.test")
        .send()
        .await
        .unwrap();
    assert!(resp.headers().get("access-control-allow-origin").is_none());

    let report = client
        .get(server.url("/cors-test"))
        .header("Origin", "http://evil.test")
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(report["allowed"], false);
    assert_eq!(report["origin"], "http://evil.test");
    assert_eq!(report["allowed_origins"][0], "http://allowed.test");

    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_releases_device() {
    let server = start_server().await;
    let client = client();
    client.post(server.url("/start_stream")).send().await.unwrap();

    let source = server.source.clone();
    server.shutdown().await;

    assert_eq!(source.acquire_count(), 1);
    assert_eq!(source.release_count(), 1);
    assert!(!source.is_held());
}
