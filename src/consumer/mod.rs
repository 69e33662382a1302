//! Consumer loops
//!
//! One independently scheduled task per consumer. The display, each MJPEG
//! client and each SSE client run the same loop (see [`runner`]) with their
//! own [`LoopProfile`] and [`FrameSink`]. Consumers never wait on each
//! other: a slow web client only slows its own loop, and frames may be
//! skipped relative to other consumers.

pub mod handle;
pub mod profile;
pub mod runner;
pub mod sink;

pub use handle::{ConsumerHandle, ConsumerInfo, ConsumerKind};
pub use profile::{LoopProfile, Pacing};
pub use runner::{ExitReason, LoopExit};
pub use sink::{ChannelSink, DisplaySink, FrameSink};
