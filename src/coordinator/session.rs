//! Streaming session state

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::consumer::{ConsumerHandle, ExitReason, LoopExit};
use crate::frame::SourceHandle;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Source acquired, loops running
    Active,
    /// Loops cancelled, waiting for them to exit
    Stopping,
}

/// One running consumer loop
pub(crate) struct ConsumerEntry {
    pub handle: ConsumerHandle,
    pub task: JoinHandle<ExitReason>,
}

/// The single streaming session
///
/// Lives inside the coordinator's critical section; only code holding that
/// lock can see or change it.
pub(crate) struct StreamSession {
    pub phase: SessionPhase,
    pub started_at: Instant,
    pub source_handle: SourceHandle,
    pub consumers: HashMap<u64, ConsumerEntry>,
    /// Cloned into every loop for exit notifications
    pub exit_tx: mpsc::UnboundedSender<LoopExit>,
    /// Task pruning exited loops from `consumers`
    pub reaper: JoinHandle<()>,
    pub last_error: Option<String>,
}

impl StreamSession {
    pub fn new(
        source_handle: SourceHandle,
        exit_tx: mpsc::UnboundedSender<LoopExit>,
        reaper: JoinHandle<()>,
    ) -> Self {
        Self {
            phase: SessionPhase::Active,
            started_at: Instant::now(),
            source_handle,
            consumers: HashMap::new(),
            exit_tx,
            reaper,
            last_error: None,
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Handles ordered by id
    pub fn handles(&self) -> Vec<ConsumerHandle> {
        let mut handles: Vec<_> = self.consumers.values().map(|e| e.handle.clone()).collect();
        handles.sort_by_key(ConsumerHandle::id);
        handles
    }

    pub fn info(&self, source: &str) -> SessionInfo {
        SessionInfo {
            phase: self.phase,
            uptime_secs: self.uptime().as_secs_f64(),
            source: source.to_string(),
            source_handle: self.source_handle.id(),
            consumers: self.consumers.len(),
            last_error: self.last_error.clone(),
        }
    }
}

/// Diagnostic view of the current session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub phase: SessionPhase,
    pub uptime_secs: f64,
    pub source: String,
    pub source_handle: u64,
    pub consumers: usize,
    /// Most recent consumer failure in this session
    pub last_error: Option<String>,
}
