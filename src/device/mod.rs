//! Built-in device implementations
//!
//! Stand-ins for the camera and panel drivers, for development machines and
//! tests. Real hardware plugs in through [`FrameSource`](crate::frame::FrameSource)
//! and [`DisplayDriver`](crate::display::DisplayDriver).

pub mod headless;
pub mod synthetic;

pub use headless::HeadlessDisplay;
pub use synthetic::SyntheticSource;
