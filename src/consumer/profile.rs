//! Per-kind loop configuration

use std::time::Duration;

use super::handle::ConsumerKind;

/// How a loop waits between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Sleep a fixed interval after each push
    Fixed(Duration),
    /// Wait until the sink can accept another frame, but no sooner than
    /// `min_interval` after the previous push
    SinkReady { min_interval: Duration },
}

/// Cadence and retry policy of one consumer kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopProfile {
    /// Pacing between iterations
    pub pacing: Pacing,

    /// Extra pull attempts after a failed pull before the loop gives up
    pub pull_retries: u32,

    /// Sleep between pull attempts
    pub retry_backoff: Duration,

    /// Capacity of the channel feeding a web client
    pub channel_capacity: usize,
}

impl LoopProfile {
    /// Display panel: 20 fps
    pub fn display() -> Self {
        Self {
            pacing: Pacing::Fixed(Duration::from_millis(50)),
            pull_retries: 3,
            retry_backoff: Duration::from_millis(100),
            channel_capacity: 1,
        }
    }

    /// MJPEG client: ~30 fps
    pub fn stream() -> Self {
        Self {
            pacing: Pacing::Fixed(Duration::from_millis(33)),
            pull_retries: 3,
            retry_backoff: Duration::from_millis(100),
            channel_capacity: 2,
        }
    }

    /// SSE client: paced by the client draining its channel, capped at 10 fps
    pub fn event() -> Self {
        Self {
            pacing: Pacing::SinkReady {
                min_interval: Duration::from_millis(100),
            },
            pull_retries: 3,
            retry_backoff: Duration::from_millis(100),
            channel_capacity: 1,
        }
    }

    /// Default profile for `kind`
    pub fn for_kind(kind: ConsumerKind) -> Self {
        match kind {
            ConsumerKind::Display => Self::display(),
            ConsumerKind::Stream => Self::stream(),
            ConsumerKind::Event => Self::event(),
        }
    }

    /// Set a fixed interval between iterations
    pub fn interval(mut self, interval: Duration) -> Self {
        self.pacing = Pacing::Fixed(interval);
        self
    }

    /// Pace by sink readiness
    pub fn sink_ready(mut self, min_interval: Duration) -> Self {
        self.pacing = Pacing::SinkReady { min_interval };
        self
    }

    /// Set pull retry count and backoff
    pub fn retries(mut self, count: u32, backoff: Duration) -> Self {
        self.pull_retries = count;
        self.retry_backoff = backoff;
        self
    }

    /// Set channel capacity (minimum 1)
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}
