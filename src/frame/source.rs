//! Capture device interface

use async_trait::async_trait;

use crate::error::{DeviceUnavailable, PullError};

use super::Frame;

/// Token proving the device was acquired
///
/// Returned by [`FrameSource::acquire`] and handed back to
/// [`FrameSource::release`] exactly once. Consumer loops borrow it for pulls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    id: u64,
}

impl SourceHandle {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// A camera (or anything that can produce frames on demand)
///
/// Implementations must allow concurrent `pull` calls from several consumer
/// loops, either because the hardware read is reentrant or because the
/// source serializes access internally. Sequence numbers must be strictly
/// increasing across all pulls.
#[async_trait]
pub trait FrameSource: Send + Sync + 'static {
    /// Open the device for a streaming session
    async fn acquire(&self) -> Result<SourceHandle, DeviceUnavailable>;

    /// Capture one frame; may suspend briefly on hardware I/O
    async fn pull(&self, handle: &SourceHandle) -> Result<Frame, PullError>;

    /// Close the device
    async fn release(&self, handle: SourceHandle);

    /// Liveness check used by the health monitor
    async fn probe(&self) -> bool {
        true
    }

    /// Human-readable device name for logs
    fn name(&self) -> &str;
}
