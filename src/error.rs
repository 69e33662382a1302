//! Error types
//!
//! Each failure class maps to a distinct blast radius:
//! - `DeviceUnavailable` fails `start()`; no session is created
//! - `NotStreaming` is returned to the caller that tried to attach
//! - `PullError` and `SinkError` terminate one consumer loop only

use std::io;

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Capture device could not be acquired (already held, hardware fault)
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceUnavailable),

    /// Attach requested while no session is active
    #[error("no active streaming session")]
    NotStreaming,

    /// Frame pull failed
    #[error(transparent)]
    Pull(#[from] PullError),

    /// Sink write failed
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Frame could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (listener bind, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The capture device refused acquisition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct DeviceUnavailable {
    pub reason: String,
}

impl DeviceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single frame pull failed
///
/// Always treated as transient by consumer loops: retried a bounded number
/// of times before the loop gives up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PullError {
    /// Device did not produce a frame in time
    #[error("frame pull timed out")]
    Timeout,
    /// Device is momentarily contended
    #[error("capture device busy")]
    Busy,
    /// Source handle is no longer valid
    #[error("source handle {0} is not acquired")]
    NotAcquired(u64),
    /// Hardware or driver error
    #[error("capture failed: {0}")]
    Device(String),
}

/// Pushing to a consumer's sink failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    /// Receiving side went away (HTTP client disconnected)
    #[error("sink closed")]
    Closed,
    /// Write to the sink failed
    #[error("sink write failed: {0}")]
    Write(String),
}

/// Frame encoding failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Pixel data length does not match width, height and format
    #[error("frame buffer of {len} bytes does not match {width}x{height} {format}")]
    BufferSize {
        len: usize,
        width: u32,
        height: u32,
        format: &'static str,
    },
    /// JPEG encoder rejected the image
    #[error("JPEG encoding failed: {0}")]
    Jpeg(String),
    /// The blocking encode task panicked or was cancelled
    #[error("encoder task failed: {0}")]
    Task(String),
}

impl Error {
    /// HTTP-facing short label, used in JSON error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::DeviceUnavailable(_) => "device_unavailable",
            Error::NotStreaming => "not_streaming",
            Error::Pull(_) => "pull_error",
            Error::Sink(_) => "sink_error",
            Error::Codec(_) => "codec_error",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
        }
    }
}
