//! Session lifecycle and consumer fan-out
//!
//! The coordinator owns the only streaming session. Starting it acquires the
//! capture device and spawns the display loop; web clients attach their own
//! loops while it runs; stopping cancels and joins every loop before the
//! device is released.
//!
//! # Architecture
//!
//! ```text
//!                        StreamCoordinator
//!                 ┌──────────────────────────────┐
//!   start/stop ──►│ session: Mutex<Option<       │
//!   attach    ──► │   StreamSession {            │
//!   detach    ──► │     source_handle,           │
//!                 │     consumers: id -> task,   │
//!                 │   }                          │
//!                 │ >                            │
//!   status()  ◄── │ streaming + handle snapshot  │
//!                 └──────────────┬───────────────┘
//!                                │ spawn
//!         ┌──────────────────────┼──────────────────────┐
//!         ▼                      ▼                      ▼
//!   [display loop]        [stream loop]          [event loop]
//!   pull ─► resize        pull ─► JPEG part      pull ─► data URI
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!   DisplayDriver         mpsc ─► HTTP body      mpsc ─► SSE
//!
//!   loop exits ──► reaper ──► removed from session (never ends it)
//! ```
//!
//! Every loop pulls on its own cadence, so a slow HTTP client never stalls
//! the display or another client.

pub mod config;
pub mod control;
pub mod session;

pub use config::CoordinatorConfig;
pub use control::{Attachment, StreamCoordinator};
pub use session::{SessionInfo, SessionPhase};
