//! Frame encoding for each consumer kind
//!
//! Everything here is a pure function of its inputs: no shared state, no
//! caches. Consumer loops call [`encode`] concurrently without coordination.
//!
//! | Kind    | Output                                              |
//! |---------|-----------------------------------------------------|
//! | Display | RGB888 resized to the panel, uncompressed           |
//! | Stream  | JPEG wrapped in an MJPEG multipart part             |
//! | Event   | JPEG as a base64 data URI inside an [`EventPayload`] |

pub mod mjpeg;

use base64::Engine;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use serde::Serialize;

use crate::consumer::ConsumerKind;
use crate::error::CodecError;
use crate::frame::{Frame, PixelBuffer, PixelFormat};

/// Default JPEG quality for web consumers
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Default display panel size (1.44" ST7735S)
pub const DEFAULT_DISPLAY_SIZE: (u32, u32) = (128, 128);

/// Encoding parameters shared by all consumers of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    /// Panel width in pixels
    pub display_width: u32,
    /// Panel height in pixels
    pub display_height: u32,
    /// JPEG quality, clamped to 1..=100 at encode time
    pub jpeg_quality: u8,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            display_width: DEFAULT_DISPLAY_SIZE.0,
            display_height: DEFAULT_DISPLAY_SIZE.1,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// SSE payload for one frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventPayload {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// `data:image/jpeg;base64,...`
    pub image: String,
}

/// Encoder output, one variant per consumer kind
#[derive(Debug, Clone)]
pub enum Encoded {
    Pixels(PixelBuffer),
    MjpegPart(Bytes),
    Event(EventPayload),
}

impl Encoded {
    /// Approximate payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            Encoded::Pixels(buf) => buf.data.len(),
            Encoded::MjpegPart(part) => part.len(),
            Encoded::Event(event) => event.image.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Encode `frame` for a consumer of `kind`
pub fn encode(frame: &Frame, kind: ConsumerKind, params: &CodecParams) -> Result<Encoded, CodecError> {
    let rgb = to_rgb(frame)?;

    match kind {
        ConsumerKind::Display => {
            let (w, h) = (params.display_width, params.display_height);
            let resized = if rgb.dimensions() == (w, h) {
                rgb
            } else {
                imageops::resize(&rgb, w, h, FilterType::Lanczos3)
            };

            Ok(Encoded::Pixels(PixelBuffer {
                width: w,
                height: h,
                sequence: frame.sequence,
                data: Bytes::from(resized.into_raw()),
            }))
        }
        ConsumerKind::Stream => {
            let jpeg = encode_jpeg(&rgb, params.jpeg_quality)?;
            Ok(Encoded::MjpegPart(mjpeg::frame_part(&jpeg)))
        }
        ConsumerKind::Event => {
            let jpeg = encode_jpeg(&rgb, params.jpeg_quality)?;
            Ok(Encoded::Event(EventPayload {
                sequence: frame.sequence,
                width: frame.width,
                height: frame.height,
                image: data_uri(&jpeg),
            }))
        }
    }
}

/// `data:` URI for a JPEG image
pub fn data_uri(jpeg: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg);
    format!("data:image/jpeg;base64,{encoded}")
}

/// Solid black JPEG served to web clients when no session is running
pub fn placeholder_jpeg(width: u32, height: u32, quality: u8) -> Result<Bytes, CodecError> {
    let img = RgbImage::from_pixel(width.max(1), height.max(1), Rgb([0, 0, 0]));
    encode_jpeg(&img, quality)
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Bytes, CodecError> {
    let mut jpeg_bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100));

    encoder
        .encode_image(img)
        .map_err(|e| CodecError::Jpeg(e.to_string()))?;

    Ok(Bytes::from(jpeg_bytes))
}

/// Normalize any supported layout to RGB888
///
/// Alpha is composited over white since JPEG has no transparency.
fn to_rgb(frame: &Frame) -> Result<RgbImage, CodecError> {
    if !frame.is_well_formed() {
        return Err(CodecError::BufferSize {
            len: frame.data.len(),
            width: frame.width,
            height: frame.height,
            format: frame.format.as_str(),
        });
    }

    let data = match frame.format {
        PixelFormat::Rgb8 => frame.data.to_vec(),
        PixelFormat::Rgba8 => frame
            .data
            .chunks_exact(4)
            .flat_map(|px| {
                let alpha = px[3] as u16;
                let blend = move |c: u8| ((c as u16 * alpha + 255 * (255 - alpha)) / 255) as u8;
                [blend(px[0]), blend(px[1]), blend(px[2])]
            })
            .collect(),
        PixelFormat::Gray8 => frame.data.iter().flat_map(|&g| [g, g, g]).collect(),
    };

    RgbImage::from_raw(frame.width, frame.height, data).ok_or(CodecError::BufferSize {
        len: frame.data.len(),
        width: frame.width,
        height: frame.height,
        format: frame.format.as_str(),
    })
}
