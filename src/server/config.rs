//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use super::cors::CorsPolicy;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 5000;

/// HTTP server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Cross-origin allow-list
    pub cors: CorsPolicy,

    /// Interval between SSE keep-alive comments
    pub sse_keep_alive: Duration,

    /// Size of the JPEG served by `/video_feed` while idle
    pub placeholder_size: (u32, u32),

    /// Quality of the placeholder JPEG
    pub placeholder_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            cors: CorsPolicy::default(),
            sse_keep_alive: Duration::from_secs(15),
            placeholder_size: (320, 240),
            placeholder_quality: crate::codec::DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Replace the CORS policy
    pub fn cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    /// Set SSE keep-alive interval
    pub fn sse_keep_alive(mut self, interval: Duration) -> Self {
        self.sse_keep_alive = interval;
        self
    }

    /// Set placeholder image size
    pub fn placeholder_size(mut self, width: u32, height: u32) -> Self {
        self.placeholder_size = (width.max(1), height.max(1));
        self
    }
}
