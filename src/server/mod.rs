//! HTTP server
//!
//! Exposes the coordinator to browsers and remote clients: MJPEG and SSE
//! streams backed by per-request consumer loops, plus start/stop and status
//! endpoints.

pub mod config;
pub mod cors;
pub mod http;
pub mod listener;

pub use config::ServerConfig;
pub use cors::CorsPolicy;
pub use http::router;
pub use listener::HttpServer;
