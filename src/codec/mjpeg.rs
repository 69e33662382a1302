//! MJPEG multipart framing
//!
//! Browsers render `multipart/x-mixed-replace` natively: point an `<img>`
//! at the endpoint and every part replaces the previous picture.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary separating parts; matches what existing clients of the
/// `/video_feed` endpoint expect.
pub const BOUNDARY: &str = "frame";

/// `Content-Type` header value for an MJPEG response
pub fn content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={BOUNDARY}")
}

/// Wrap one JPEG image as a multipart part (boundary, headers, body, CRLF)
pub fn frame_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}
