//! Local control surfaces

pub mod buttons;

pub use buttons::{feed_from_lines, run_button_loop, ButtonEvent, Debouncer};
