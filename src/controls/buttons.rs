//! Physical button surface
//!
//! Button presses arrive as [`ButtonEvent`]s over a channel, from a GPIO
//! poller on the device or from [`feed_from_lines`] elsewhere. Each button is
//! debounced on its own; Start and Stop map onto the same coordinator
//! operations the HTTP surface uses.

use std::collections::HashMap;
use std::io::BufRead;
use std::str::FromStr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::coordinator::StreamCoordinator;
use crate::display;
use crate::error::Error;

/// BCM pin of KEY1 (start)
pub const START_PIN: u8 = 21;
/// BCM pin of KEY2 (exit)
pub const EXIT_PIN: u8 = 20;
/// BCM pin of KEY3 (stop)
pub const STOP_PIN: u8 = 16;

/// Minimum time between two accepted presses of the same button
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// A button press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEvent {
    Start,
    Exit,
    Stop,
}

impl ButtonEvent {
    /// Map a BCM pin to its button
    pub fn from_pin(pin: u8) -> Option<Self> {
        match pin {
            START_PIN => Some(ButtonEvent::Start),
            EXIT_PIN => Some(ButtonEvent::Exit),
            STOP_PIN => Some(ButtonEvent::Stop),
            _ => None,
        }
    }

    pub fn pin(self) -> u8 {
        match self {
            ButtonEvent::Start => START_PIN,
            ButtonEvent::Exit => EXIT_PIN,
            ButtonEvent::Stop => STOP_PIN,
        }
    }
}

impl std::fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ButtonEvent::Start => write!(f, "KEY1"),
            ButtonEvent::Exit => write!(f, "KEY2"),
            ButtonEvent::Stop => write!(f, "KEY3"),
        }
    }
}

impl FromStr for ButtonEvent {
    type Err = Error;

    /// Accepts `1`/`start`, `2`/`exit`, `3`/`stop` (and `key1`..`key3`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "key1" | "start" => Ok(ButtonEvent::Start),
            "2" | "key2" | "exit" | "quit" => Ok(ButtonEvent::Exit),
            "3" | "key3" | "stop" => Ok(ButtonEvent::Stop),
            other => Err(Error::Config(format!("unknown button command: {other:?}"))),
        }
    }
}

/// Per-button debounce filter
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last: HashMap<ButtonEvent, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: HashMap::new(),
        }
    }

    /// Whether a press at `now` counts; accepted presses restart the window
    pub fn accept(&mut self, event: ButtonEvent, now: Instant) -> bool {
        match self.last.get(&event) {
            Some(prev) if now.saturating_duration_since(*prev) < self.window => false,
            _ => {
                self.last.insert(event, now);
                true
            }
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

/// Handle button presses until Exit, channel close or `shutdown`
///
/// Exit stops the session, shows the goodbye screen and cancels
/// `shutdown` so the rest of the process winds down too.
pub async fn run_button_loop(
    coordinator: StreamCoordinator,
    mut events: mpsc::Receiver<ButtonEvent>,
    mut debouncer: Debouncer,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if !debouncer.accept(event, Instant::now()) {
            tracing::trace!(button = %event, "Press ignored (debounce)");
            continue;
        }

        tracing::info!(button = %event, pin = event.pin(), "Button pressed");

        match event {
            ButtonEvent::Start => {
                if let Err(e) = coordinator.start().await {
                    tracing::warn!(button = %event, error = %e, "Start failed");
                }
            }
            ButtonEvent::Stop => {
                if let Err(e) = coordinator.stop().await {
                    tracing::warn!(button = %event, error = %e, "Stop failed");
                }
            }
            ButtonEvent::Exit => {
                if let Err(e) = coordinator.stop().await {
                    tracing::warn!(button = %event, error = %e, "Stop failed");
                }
                coordinator
                    .show_message(display::GOODBYE_MESSAGE.iter().map(|l| l.to_string()).collect())
                    .await;
                shutdown.cancel();
                break;
            }
        }
    }

    tracing::debug!("Button loop finished");
}

/// Translate text commands, one per line, into button events
///
/// Blocking: run it on its own thread. Unknown lines are logged and
/// skipped. Returns when the reader hits EOF or the receiver is gone.
pub fn feed_from_lines<R>(reader: R, events: mpsc::Sender<ButtonEvent>)
where
    R: BufRead,
{
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read button command");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ButtonEvent>() {
            Ok(event) => {
                if events.blocking_send(event).is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring input"),
        }
    }
}
