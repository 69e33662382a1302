//! Consumer handles
//!
//! A [`ConsumerHandle`] is the coordinator's view of one running loop. The
//! loop updates the counters; the coordinator and the status endpoint only
//! read them.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// What a consumer loop feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    /// Local display panel
    Display,
    /// HTTP MJPEG client
    Stream,
    /// Server-sent events client
    Event,
}

impl ConsumerKind {
    /// Whether this consumer is a remote (web) client
    pub fn is_web(self) -> bool {
        matches!(self, ConsumerKind::Stream | ConsumerKind::Event)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConsumerKind::Display => "display",
            ConsumerKind::Stream => "http-stream",
            ConsumerKind::Event => "sse",
        }
    }
}

impl std::fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct HandleInner {
    id: u64,
    kind: ConsumerKind,
    cancel: CancellationToken,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last successful push
    last_activity_ms: AtomicU64,
    consecutive_failures: AtomicU32,
    frames_delivered: AtomicU64,
    last_sequence: AtomicU64,
    active: AtomicBool,
}

/// Shared handle to one consumer loop
#[derive(Clone)]
pub struct ConsumerHandle {
    inner: Arc<HandleInner>,
}

impl ConsumerHandle {
    pub(crate) fn new(id: u64, kind: ConsumerKind) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                kind,
                cancel: CancellationToken::new(),
                created_at: Instant::now(),
                last_activity_ms: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                frames_delivered: AtomicU64::new(0),
                last_sequence: AtomicU64::new(0),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Unique consumer id (never reused within a process)
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn kind(&self) -> ConsumerKind {
        self.inner.kind
    }

    /// Whether the loop is still running
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    pub fn frames_delivered(&self) -> u64 {
        self.inner.frames_delivered.load(Ordering::Relaxed)
    }

    /// Sequence number of the last frame pushed, 0 before the first push
    pub fn last_sequence(&self) -> u64 {
        self.inner.last_sequence.load(Ordering::Relaxed)
    }

    /// Time of the last successful push (creation time before any)
    pub fn last_activity(&self) -> Instant {
        let offset = self.inner.last_activity_ms.load(Ordering::Relaxed);
        self.inner.created_at + Duration::from_millis(offset)
    }

    /// Diagnostic snapshot
    pub fn info(&self) -> ConsumerInfo {
        ConsumerInfo {
            id: self.id(),
            kind: self.kind(),
            active: self.is_active(),
            consecutive_failures: self.consecutive_failures(),
            frames_delivered: self.frames_delivered(),
            last_sequence: self.last_sequence(),
            idle_ms: self.last_activity().elapsed().as_millis() as u64,
        }
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub(crate) fn record_failure(&self) -> u32 {
        self.inner.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_delivery(&self, sequence: u64) {
        let elapsed = self.inner.created_at.elapsed().as_millis() as u64;
        self.inner.last_activity_ms.store(elapsed, Ordering::Relaxed);
        self.inner.consecutive_failures.store(0, Ordering::Relaxed);
        self.inner.frames_delivered.fetch_add(1, Ordering::Relaxed);
        self.inner.last_sequence.store(sequence, Ordering::Relaxed);
    }

    pub(crate) fn mark_exited(&self) {
        self.inner.active.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("active", &self.is_active())
            .finish()
    }
}

impl PartialEq for ConsumerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for ConsumerHandle {}

/// Per-consumer diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerInfo {
    pub id: u64,
    pub kind: ConsumerKind,
    pub active: bool,
    pub consecutive_failures: u32,
    pub frames_delivered: u64,
    pub last_sequence: u64,
    /// Milliseconds since the last successful push
    pub idle_ms: u64,
}
