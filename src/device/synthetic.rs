//! Synthetic capture device
//!
//! Renders a moving gradient test pattern. Used when no camera is attached
//! and by the test suite, which can inject pull failures and toggle
//! availability.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{DeviceUnavailable, PullError};
use crate::frame::{Frame, FrameSource, PixelFormat, SourceHandle};

/// Test-pattern frame source
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    /// Handle id of the current holder
    held: Mutex<Option<u64>>,
    next_handle: AtomicU64,
    sequence: AtomicU64,
    available: AtomicBool,
    alive: AtomicBool,
    failing_pulls: AtomicU32,
    pulls: AtomicU64,
    acquires: AtomicU64,
    releases: AtomicU64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            held: Mutex::new(None),
            next_handle: AtomicU64::new(1),
            sequence: AtomicU64::new(0),
            available: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            failing_pulls: AtomicU32::new(0),
            pulls: AtomicU64::new(0),
            acquires: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    /// Make `acquire` fail while false
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Answer liveness probes with `alive`
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Fail the next `count` pulls with [`PullError::Busy`]
    pub fn fail_next_pulls(&self, count: u32) {
        self.failing_pulls.store(count, Ordering::SeqCst);
    }

    /// Pull attempts so far, failed ones included
    pub fn pull_count(&self) -> u64 {
        self.pulls.load(Ordering::SeqCst)
    }

    pub fn acquire_count(&self) -> u64 {
        self.acquires.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> u64 {
        self.releases.load(Ordering::SeqCst)
    }

    /// Whether a session currently holds the device
    pub fn is_held(&self) -> bool {
        self.lock_held().is_some()
    }

    fn lock_held(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_pulls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn render(&self, sequence: u64) -> Bytes {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = (sequence % 256) as usize;
        let mut data = Vec::with_capacity(w * h * 3);

        for y in 0..h {
            for x in 0..w {
                data.push(((x * 255 / w + shift) % 256) as u8);
                data.push(((y * 255 / h) % 256) as u8);
                data.push((255 - (shift % 256)) as u8);
            }
        }

        Bytes::from(data)
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn acquire(&self) -> Result<SourceHandle, DeviceUnavailable> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(DeviceUnavailable::new("synthetic device disabled"));
        }

        let mut held = self.lock_held();
        if let Some(id) = *held {
            return Err(DeviceUnavailable::new(format!(
                "device already held by handle {id}"
            )));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        *held = Some(id);
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(SourceHandle::new(id))
    }

    async fn pull(&self, handle: &SourceHandle) -> Result<Frame, PullError> {
        self.pulls.fetch_add(1, Ordering::SeqCst);

        if *self.lock_held() != Some(handle.id()) {
            return Err(PullError::NotAcquired(handle.id()));
        }
        if self.take_injected_failure() {
            return Err(PullError::Busy);
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Frame::new(
            sequence,
            self.width,
            self.height,
            PixelFormat::Rgb8,
            self.render(sequence),
        ))
    }

    async fn release(&self, handle: SourceHandle) {
        let mut held = self.lock_held();
        if *held == Some(handle.id()) {
            *held = None;
            self.releases.fetch_add(1, Ordering::SeqCst);
        } else {
            tracing::warn!(handle = handle.id(), "Release of a handle that is not held");
        }
    }

    async fn probe(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
