//! Consumer sinks
//!
//! A sink is where a loop pushes encoded frames. Web clients get a bounded
//! channel drained by the HTTP response body; the display gets a blocking
//! blit on the panel driver.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::codec::Encoded;
use crate::display::DisplayDriver;
use crate::error::SinkError;

/// Destination of one consumer loop
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Deliver one encoded frame, all-or-nothing
    async fn push(&mut self, frame: Encoded) -> Result<(), SinkError>;

    /// Whether an in-flight push may be dropped on cancellation
    ///
    /// Sinks whose write keeps running once started (a blit on a blocking
    /// thread) return false; the loop then lets the push finish before it
    /// looks at the cancellation token.
    fn cancel_safe(&self) -> bool {
        true
    }

    /// Resolve once the sink can accept another frame
    async fn ready(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Bounded channel sink for HTTP and SSE clients
pub struct ChannelSink {
    tx: mpsc::Sender<Encoded>,
}

impl ChannelSink {
    /// Create a sink and the receiver the HTTP layer drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Encoded>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn push(&mut self, frame: Encoded) -> Result<(), SinkError> {
        self.tx.send(frame).await.map_err(|_| SinkError::Closed)
    }

    async fn ready(&mut self) -> Result<(), SinkError> {
        // Dropping the permit gives the slot back
        self.tx.reserve().await.map(drop).map_err(|_| SinkError::Closed)
    }
}

/// Sink writing pixel buffers to the display panel
pub struct DisplaySink {
    driver: Arc<dyn DisplayDriver>,
}

impl DisplaySink {
    pub fn new(driver: Arc<dyn DisplayDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl FrameSink for DisplaySink {
    async fn push(&mut self, frame: Encoded) -> Result<(), SinkError> {
        let Encoded::Pixels(buffer) = frame else {
            return Err(SinkError::Write("display accepts pixel buffers only".into()));
        };

        let driver = Arc::clone(&self.driver);
        tokio::task::spawn_blocking(move || driver.blit(&buffer))
            .await
            .map_err(|e| SinkError::Write(format!("blit task failed: {e}")))?
    }

    fn cancel_safe(&self) -> bool {
        false
    }
}
