//! Stream coordinator implementation
//!
//! The one place that creates and destroys sessions. Control operations
//! from every surface (buttons, HTTP) funnel through the same idempotent
//! methods, serialized by a single async mutex around the session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::consumer::runner::{run_consumer_loop, LoopContext};
use crate::consumer::{
    ChannelSink, ConsumerHandle, ConsumerInfo, ConsumerKind, DisplaySink, FrameSink, LoopExit,
};
use crate::codec::Encoded;
use crate::display::{self, DisplayDriver};
use crate::error::{Error, Result};
use crate::frame::FrameSource;
use crate::health::{HealthMonitor, HealthProbe, HealthStatus, NetworkStatus, SourceProbe};

use super::config::CoordinatorConfig;
use super::session::{ConsumerEntry, SessionInfo, SessionPhase, StreamSession};

/// A freshly attached web consumer
///
/// The HTTP layer drains `frames` into the response body and calls
/// [`StreamCoordinator::detach_consumer`] with `handle` when the client goes
/// away.
#[derive(Debug)]
pub struct Attachment {
    pub handle: ConsumerHandle,
    pub frames: mpsc::Receiver<Encoded>,
}

struct Inner {
    source: Arc<dyn FrameSource>,
    display: Arc<dyn DisplayDriver>,
    probe: Arc<dyn HealthProbe>,
    config: CoordinatorConfig,

    /// The critical section: session existence and its handle set
    session: tokio::sync::Mutex<Option<StreamSession>>,

    /// Lock-free mirrors of the session for `status()`
    streaming: AtomicBool,
    handles: RwLock<Vec<ConsumerHandle>>,

    health: HealthMonitor,
    next_consumer_id: AtomicU64,
    /// Last failed `start()`, kept across sessions
    last_start_error: Mutex<Option<String>>,
}

/// Owner of the streaming session
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct StreamCoordinator {
    inner: Arc<Inner>,
}

impl StreamCoordinator {
    /// Create a coordinator probing the capture device for health
    pub fn new(
        source: Arc<dyn FrameSource>,
        display: Arc<dyn DisplayDriver>,
        config: CoordinatorConfig,
    ) -> Self {
        let probe = Arc::new(SourceProbe::new(Arc::clone(&source)));
        Self::with_probe(source, display, probe, config)
    }

    /// Create a coordinator with a custom health probe
    pub fn with_probe(
        source: Arc<dyn FrameSource>,
        display: Arc<dyn DisplayDriver>,
        probe: Arc<dyn HealthProbe>,
        config: CoordinatorConfig,
    ) -> Self {
        let health = HealthMonitor::new(config.health.failure_threshold);

        Self {
            inner: Arc::new(Inner {
                source,
                display,
                probe,
                config,
                session: tokio::sync::Mutex::new(None),
                streaming: AtomicBool::new(false),
                handles: RwLock::new(Vec::new()),
                health,
                next_consumer_id: AtomicU64::new(1),
                last_start_error: Mutex::new(None),
            }),
        }
    }

    /// Get the coordinator configuration
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Start streaming
    ///
    /// Idempotent: if a session is already active the current status is
    /// returned and nothing else happens. Concurrent callers serialize on the
    /// session lock, so the device is acquired at most once.
    pub async fn start(&self) -> Result<HealthStatus> {
        let mut guard = self.inner.session.lock().await;

        if guard.is_some() {
            tracing::debug!("Start requested while already streaming");
            drop(guard);
            return Ok(self.status());
        }

        self.inner.show(display::STARTING_MESSAGE).await;

        let source_handle = match self.inner.source.acquire().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    source = self.inner.source.name(),
                    error = %e,
                    "Capture device unavailable, session not started"
                );
                self.inner.set_start_error(Some(e.to_string()));
                self.inner.show(display::UNAVAILABLE_MESSAGE).await;
                return Err(Error::DeviceUnavailable(e));
            }
        };

        let (exit_tx, exit_rx) = mpsc::unbounded_channel();
        let reaper = tokio::spawn(reap_exited(Arc::downgrade(&self.inner), exit_rx));
        let mut session = StreamSession::new(source_handle, exit_tx, reaper);

        if self.inner.config.display_enabled {
            let sink = DisplaySink::new(Arc::clone(&self.inner.display));
            self.inner
                .spawn_consumer(&mut session, ConsumerKind::Display, Box::new(sink));
        }

        self.inner.set_start_error(None);
        self.inner.streaming.store(true, Ordering::Release);
        self.inner.publish_handles(Some(&session));

        tracing::info!(
            source = self.inner.source.name(),
            source_handle = session.source_handle.id(),
            display = self.inner.config.display_enabled,
            "Streaming session started"
        );

        *guard = Some(session);
        drop(guard);

        Ok(self.status())
    }

    /// Stop streaming
    ///
    /// Idempotent. Cancels every consumer, waits for each loop to exit,
    /// then releases the capture device exactly once.
    pub async fn stop(&self) -> Result<HealthStatus> {
        let mut guard = self.inner.session.lock().await;

        let Some(mut session) = guard.take() else {
            tracing::debug!("Stop requested while not streaming");
            drop(guard);
            return Ok(self.status());
        };

        session.phase = SessionPhase::Stopping;
        let entries: Vec<ConsumerEntry> = session.consumers.drain().map(|(_, e)| e).collect();

        for entry in &entries {
            entry.handle.cancel();
        }
        for entry in entries {
            join_consumer(entry).await;
        }

        let StreamSession {
            source_handle,
            reaper,
            started_at,
            ..
        } = session;
        reaper.abort();

        self.inner.source.release(source_handle).await;
        self.inner.streaming.store(false, Ordering::Release);
        self.inner.publish_handles(None);

        self.inner.show(display::STOPPED_MESSAGE).await;

        tracing::info!(
            source = self.inner.source.name(),
            uptime_secs = started_at.elapsed().as_secs(),
            "Streaming session stopped"
        );

        drop(guard);
        Ok(self.status())
    }

    /// Attach an MJPEG consumer to the running session
    pub async fn attach_stream_consumer(&self) -> Result<Attachment> {
        self.attach_channel(ConsumerKind::Stream).await
    }

    /// Attach an SSE consumer to the running session
    pub async fn attach_event_consumer(&self) -> Result<Attachment> {
        self.attach_channel(ConsumerKind::Event).await
    }

    async fn attach_channel(&self, kind: ConsumerKind) -> Result<Attachment> {
        let capacity = self.inner.config.profile_for(kind).channel_capacity;
        let (sink, frames) = ChannelSink::channel(capacity);
        let handle = self.attach_consumer(kind, Box::new(sink)).await?;
        Ok(Attachment { handle, frames })
    }

    /// Attach a consumer loop with a caller-supplied sink
    ///
    /// Fails with [`Error::NotStreaming`] if no session is active.
    pub async fn attach_consumer(
        &self,
        kind: ConsumerKind,
        sink: Box<dyn FrameSink>,
    ) -> Result<ConsumerHandle> {
        let mut guard = self.inner.session.lock().await;
        let session = guard.as_mut().ok_or(Error::NotStreaming)?;

        let handle = self.inner.spawn_consumer(session, kind, sink);
        self.inner.publish_handles(Some(session));

        tracing::info!(
            consumer = handle.id(),
            kind = %kind,
            consumers = session.consumers.len(),
            "Consumer attached"
        );

        Ok(handle)
    }

    /// Detach one consumer
    ///
    /// Cancels and joins that loop only. Never ends the session, even when
    /// the last web consumer leaves. Unknown or already exited handles are
    /// ignored.
    pub async fn detach_consumer(&self, handle: &ConsumerHandle) {
        let mut guard = self.inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        let Some(entry) = session.consumers.remove(&handle.id()) else {
            return;
        };

        entry.handle.cancel();
        join_consumer(entry).await;
        self.inner.publish_handles(Some(session));

        tracing::info!(
            consumer = handle.id(),
            kind = %handle.kind(),
            consumers = session.consumers.len(),
            "Consumer detached"
        );
    }

    /// Current status; never waits on the session lock or a frame pull
    pub fn status(&self) -> HealthStatus {
        let streaming = self.inner.streaming.load(Ordering::Acquire);
        let handles = self
            .inner
            .handles
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        HealthStatus::collect(streaming, &handles, &self.inner.health)
    }

    /// Per-consumer diagnostics
    pub fn consumers(&self) -> Vec<ConsumerInfo> {
        self.status().consumers
    }

    /// Whether a session is active
    pub fn is_streaming(&self) -> bool {
        self.inner.streaming.load(Ordering::Acquire)
    }

    /// Session diagnostics, `None` while idle
    pub async fn session_info(&self) -> Option<SessionInfo> {
        let guard = self.inner.session.lock().await;
        guard.as_ref().map(|s| s.info(self.inner.source.name()))
    }

    /// Error from the last failed `start()`, cleared by a successful one
    pub fn last_start_error(&self) -> Option<String> {
        self.inner
            .last_start_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Health check details
    pub fn network_status(&self) -> NetworkStatus {
        let health = &self.inner.health;
        NetworkStatus {
            network_stable: health.is_stable(),
            failed_checks: health.failed_checks(),
            max_failed_checks: health.threshold(),
            total_checks: health.total_checks(),
            check_interval_secs: self.inner.config.health.interval.as_secs_f64(),
            last_check_secs_ago: health.since_last_check().map(|d| d.as_secs_f64()),
            probe: self.inner.probe.name().to_string(),
        }
    }

    /// Run one health check now; returns the resulting stability
    pub async fn check_health(&self) -> bool {
        self.inner.check_health().await
    }

    /// Spawn the periodic health check task
    ///
    /// Runs on its own timer, independent of any consumer cadence. Returns a
    /// handle that can be used to abort the task.
    pub fn spawn_health_task(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let interval = inner.config.health.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                inner.check_health().await;
            }
        })
    }

    /// Show a status screen on the display
    pub async fn show_message(&self, lines: Vec<String>) {
        let display = Arc::clone(&self.inner.display);
        let _ = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
            display.show_message(&refs);
        })
        .await;
    }

    /// Blank the display
    pub async fn clear_display(&self) {
        let display = Arc::clone(&self.inner.display);
        let _ = tokio::task::spawn_blocking(move || display.clear()).await;
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCoordinator")
            .field("source", &self.inner.source.name())
            .field("streaming", &self.is_streaming())
            .finish()
    }
}

impl Inner {
    /// Spawn a loop for `kind` and register it in `session`
    fn spawn_consumer(
        &self,
        session: &mut StreamSession,
        kind: ConsumerKind,
        sink: Box<dyn FrameSink>,
    ) -> ConsumerHandle {
        let id = self.next_consumer_id.fetch_add(1, Ordering::Relaxed);
        let handle = ConsumerHandle::new(id, kind);

        // The panel decides the blit size, whatever the config says
        let mut codec = self.config.codec;
        if kind == ConsumerKind::Display {
            let (width, height) = self.display.size();
            codec.display_width = width;
            codec.display_height = height;
        }

        let ctx = LoopContext {
            handle: handle.clone(),
            source: Arc::clone(&self.source),
            source_handle: session.source_handle.clone(),
            codec,
            profile: self.config.profile_for(kind).clone(),
            exit_tx: session.exit_tx.clone(),
        };

        let task = tokio::spawn(run_consumer_loop(ctx, sink));
        session.consumers.insert(
            id,
            ConsumerEntry {
                handle: handle.clone(),
                task,
            },
        );

        handle
    }

    /// Refresh the lock-free handle mirror
    fn publish_handles(&self, session: Option<&StreamSession>) {
        let handles = session.map(StreamSession::handles).unwrap_or_default();
        let mut mirror = self
            .handles
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *mirror = handles;
    }

    fn set_start_error(&self, error: Option<String>) {
        let mut last = self
            .last_start_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = error;
    }

    async fn show(&self, lines: &'static [&'static str]) {
        let display = Arc::clone(&self.display);
        let _ = tokio::task::spawn_blocking(move || display.show_message(lines)).await;
    }

    async fn check_health(&self) -> bool {
        let timeout = self.config.health.timeout;
        let ok = tokio::time::timeout(timeout, self.probe.check())
            .await
            .unwrap_or(false);

        let was_stable = self.health.is_stable();
        let stable = self.health.record(ok);

        match (was_stable, stable) {
            (true, false) => tracing::warn!(
                probe = self.probe.name(),
                failed_checks = self.health.failed_checks(),
                "Network unstable"
            ),
            (false, true) => tracing::info!(probe = self.probe.name(), "Network recovered"),
            _ if !ok => tracing::debug!(
                probe = self.probe.name(),
                failed_checks = self.health.failed_checks(),
                "Health check failed"
            ),
            _ => {}
        }

        stable
    }
}

/// Wait for a cancelled loop to finish
async fn join_consumer(entry: ConsumerEntry) {
    let id = entry.handle.id();
    match entry.task.await {
        Ok(reason) => tracing::debug!(consumer = id, reason = %reason, "Consumer loop joined"),
        Err(e) => tracing::warn!(consumer = id, error = %e, "Consumer loop panicked"),
    }
}

/// Prune loops that exited on their own from the session
async fn reap_exited(inner: Weak<Inner>, mut exits: mpsc::UnboundedReceiver<LoopExit>) {
    while let Some(exit) = exits.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };

        let mut guard = inner.session.lock().await;
        let Some(session) = guard.as_mut() else {
            continue;
        };

        if session.consumers.remove(&exit.consumer_id).is_some() {
            if exit.reason.is_failure() {
                session.last_error = Some(format!("consumer {}: {}", exit.consumer_id, exit.reason));
            }
            inner.publish_handles(Some(session));

            tracing::debug!(
                consumer = exit.consumer_id,
                reason = %exit.reason,
                consumers = session.consumers.len(),
                "Exited consumer removed"
            );
        }
    }
}
