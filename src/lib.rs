//! Camera frame distribution with lifecycle coordination
//!
//! One capture device feeds several independently paced consumers: a small
//! local display panel, MJPEG clients and SSE clients. Physical buttons and
//! HTTP endpoints both start and stop the session through the same
//! [`StreamCoordinator`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use picam_stream::device::{HeadlessDisplay, SyntheticSource};
//! use picam_stream::{CoordinatorConfig, HttpServer, ServerConfig, StreamCoordinator};
//!
//! #[tokio::main]
//! async fn main() -> picam_stream::Result<()> {
//!     let coordinator = StreamCoordinator::new(
//!         Arc::new(SyntheticSource::new(640, 480)),
//!         Arc::new(HeadlessDisplay::new(128, 128)),
//!         CoordinatorConfig::default(),
//!     );
//!     coordinator.start().await?;
//!
//!     HttpServer::new(ServerConfig::default(), coordinator).run().await
//! }
//! ```

pub mod codec;
pub mod consumer;
pub mod controls;
pub mod coordinator;
pub mod device;
pub mod display;
pub mod error;
pub mod frame;
pub mod health;
pub mod server;
pub mod settings;

pub use codec::{CodecParams, Encoded, EventPayload};
pub use consumer::{ConsumerHandle, ConsumerInfo, ConsumerKind, FrameSink, LoopProfile};
pub use coordinator::{Attachment, CoordinatorConfig, StreamCoordinator};
pub use display::DisplayDriver;
pub use error::{Error, Result};
pub use frame::{Frame, FrameSource, PixelBuffer, PixelFormat, SourceHandle};
pub use health::{HealthConfig, HealthStatus, NetworkStatus};
pub use server::{HttpServer, ServerConfig};
pub use settings::Settings;
