//! Local display panel interface
//!
//! The panel driver itself (SPI init, RGB565 conversion, scan direction) is
//! an external collaborator. The coordinator only needs to blit a fixed-size
//! buffer and to show short status screens between sessions.

use crate::error::SinkError;
use crate::frame::PixelBuffer;

/// Screen shown while the device is being acquired
pub const STARTING_MESSAGE: &[&str] = &["Starting Stream...", "Web: Available", "LCD: Active", "Press KEY3 to stop"];

/// Screen shown after a session ends
pub const STOPPED_MESSAGE: &[&str] = &["Stream Stopped", "Press KEY1 to start", "Press KEY2 to exit"];

/// Screen shown when acquisition fails
pub const UNAVAILABLE_MESSAGE: &[&str] = &["Camera Unavailable", "Check connection", "Press KEY1 to retry"];

/// Screen shown on program exit
pub const GOODBYE_MESSAGE: &[&str] = &["Goodbye!", "Shutting down..."];

/// A physical display that accepts whole-frame pixel buffers
///
/// `blit` is a blocking hardware write; consumer loops call it from a
/// blocking thread so the async runtime is never stalled.
pub trait DisplayDriver: Send + Sync + 'static {
    /// Panel resolution in pixels (width, height)
    fn size(&self) -> (u32, u32);

    /// Write a full frame to the panel
    fn blit(&self, buffer: &PixelBuffer) -> Result<(), SinkError>;

    /// Render a few lines of status text
    fn show_message(&self, _lines: &[&str]) {}

    /// Blank the panel
    fn clear(&self) {}
}

/// Welcome screen shown while idle
pub fn welcome_message(network_stable: bool) -> [String; 4] {
    let network = if network_stable { "Connected" } else { "Unstable" };
    [
        "Pi Camera Stream".to_string(),
        "KEY1: Start Stream".to_string(),
        "KEY2: Exit".to_string(),
        format!("Network: {network}"),
    ]
}
