//! Captured frames and the capture device interface
//!
//! A [`Frame`] is immutable once produced. It is cheap to clone because the
//! pixel data lives in a reference-counted `Bytes`; every consumer loop reads
//! the same allocation and re-encodes it for its own sink.

pub mod source;

use bytes::Bytes;

pub use source::{FrameSource, SourceHandle};

/// Pixel layout of a frame buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit RGB, 3 bytes per pixel
    Rgb8,
    /// 8-bit RGBA, 4 bytes per pixel (picamera-style XBGR/RGBA preview)
    Rgba8,
    /// 8-bit luminance, 1 byte per pixel
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb8 => "rgb8",
            PixelFormat::Rgba8 => "rgba8",
            PixelFormat::Gray8 => "gray8",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One capture result
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number assigned by the source
    pub sequence: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Row-major pixel data (zero-copy via reference counting)
    pub data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sequence: u64, width: u32, height: u32, format: PixelFormat, data: Bytes) -> Self {
        Self {
            sequence,
            width,
            height,
            format,
            data,
        }
    }

    /// Number of bytes `data` must hold for the declared geometry
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Whether `data` matches the declared geometry
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

/// Fixed-size RGB888 buffer ready to be blitted to the display panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    /// Sequence of the frame this buffer was derived from
    pub sequence: u64,
    /// RGB888, row-major
    pub data: Bytes,
}
