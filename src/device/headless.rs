//! Display driver without a panel
//!
//! Accepts blits and status screens and keeps just enough of them to be
//! inspected. Status screens are also logged so a headless run still shows
//! what the panel would.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::display::DisplayDriver;
use crate::error::SinkError;
use crate::frame::PixelBuffer;

#[derive(Debug)]
pub struct HeadlessDisplay {
    width: u32,
    height: u32,
    blits: AtomicU64,
    last_sequence: AtomicU64,
    failing: AtomicBool,
    last_message: Mutex<Option<Vec<String>>>,
}

impl HeadlessDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            blits: AtomicU64::new(0),
            last_sequence: AtomicU64::new(0),
            failing: AtomicBool::new(false),
            last_message: Mutex::new(None),
        }
    }

    /// Make every blit fail, as an unplugged panel would
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn blit_count(&self) -> u64 {
        self.blits.load(Ordering::SeqCst)
    }

    /// Sequence of the most recently blitted frame
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::SeqCst)
    }

    /// Lines of the most recent status screen, `None` after `clear`
    pub fn last_message(&self) -> Option<Vec<String>> {
        self.last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl DisplayDriver for HeadlessDisplay {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn blit(&self, buffer: &PixelBuffer) -> Result<(), SinkError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Write("display not responding".into()));
        }
        if (buffer.width, buffer.height) != (self.width, self.height) {
            return Err(SinkError::Write(format!(
                "buffer is {}x{}, panel is {}x{}",
                buffer.width, buffer.height, self.width, self.height
            )));
        }

        self.blits.fetch_add(1, Ordering::SeqCst);
        self.last_sequence.store(buffer.sequence, Ordering::SeqCst);
        Ok(())
    }

    fn show_message(&self, lines: &[&str]) {
        tracing::info!(screen = %lines.join(" | "), "Display message");
        *self
            .last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(lines.iter().map(|l| l.to_string()).collect());
    }

    fn clear(&self) {
        *self
            .last_message
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn buffer(width: u32, height: u32) -> PixelBuffer {
        PixelBuffer {
            width,
            height,
            sequence: 7,
            data: Bytes::from(vec![0; (width * height * 3) as usize]),
        }
    }

    #[test]
    fn test_blit_checks_size() {
        let display = HeadlessDisplay::new(4, 4);

        assert!(display.blit(&buffer(4, 4)).is_ok());
        assert!(display.blit(&buffer(2, 2)).is_err());
        assert_eq!(display.blit_count(), 1);
        assert_eq!(display.last_sequence(), 7);
    }

    #[test]
    fn test_failing_panel() {
        let display = HeadlessDisplay::new(4, 4);
        display.set_failing(true);
        assert!(matches!(display.blit(&buffer(4, 4)), Err(SinkError::Write(_))));
    }

    #[test]
    fn test_messages() {
        let display = HeadlessDisplay::new(4, 4);
        display.show_message(&["Stream Stopped", "Press KEY1 to start"]);
        assert_eq!(display.last_message().unwrap()[0], "Stream Stopped");

        display.clear();
        assert!(display.last_message().is_none());
    }
}
