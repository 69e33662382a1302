//! File configuration
//!
//! Optional TOML file mapped onto the runtime configs. Every key has a
//! default, so an empty file (or none at all) gives the stock behaviour:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [server.cors]
//! allowed_origins = ["http://localhost:5173"]
//! allowed_suffixes = [".lovable.app"]
//!
//! [display]
//! enabled = true
//!
//! [pacing]
//! stream_interval_ms = 33
//!
//! [health]
//! probe = "tcp"
//! target = "8.8.8.8:53"
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::codec::{CodecParams, DEFAULT_DISPLAY_SIZE, DEFAULT_JPEG_QUALITY};
use crate::consumer::{ConsumerKind, LoopProfile};
use crate::coordinator::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::frame::FrameSource;
use crate::health::{HealthConfig, HealthProbe, SourceProbe, TcpProbe};
use crate::server::{CorsPolicy, ServerConfig};

/// Top-level file configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub server: ServerSettings,
    pub display: DisplaySettings,
    pub pacing: PacingSettings,
    pub health: HealthSettings,
    pub buttons: ButtonSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind: String,
    pub cors: CorsPolicy,
    pub sse_keep_alive_secs: u64,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    pub jpeg_quality: u8,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{}", crate::server::config::DEFAULT_PORT),
            cors: CorsPolicy::default(),
            sse_keep_alive_secs: 15,
            placeholder_width: 320,
            placeholder_height: 240,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySettings {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            width: DEFAULT_DISPLAY_SIZE.0,
            height: DEFAULT_DISPLAY_SIZE.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PacingSettings {
    pub display_interval_ms: u64,
    pub stream_interval_ms: u64,
    pub event_min_interval_ms: u64,
    pub pull_retries: u32,
    pub retry_backoff_ms: u64,
    pub stream_buffer: usize,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            display_interval_ms: 50,
            stream_interval_ms: 33,
            event_min_interval_ms: 100,
            pull_retries: 3,
            retry_backoff_ms: 100,
            stream_buffer: 2,
        }
    }
}

/// Which liveness probe feeds `network_stable`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Ask the capture device
    Device,
    /// TCP connect to `target`
    Tcp,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthSettings {
    pub probe: ProbeKind,
    pub target: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub failure_threshold: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe: ProbeKind::Device,
            target: "8.8.8.8:53".into(),
            interval_secs: 5,
            timeout_secs: 3,
            failure_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ButtonSettings {
    pub debounce_ms: u64,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read settings from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    /// Parsed bind address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid bind address {:?}: {}", self.server.bind, e)))
    }

    pub fn server_config(&self) -> Result<ServerConfig> {
        let mut config = ServerConfig::with_addr(self.bind_addr()?)
            .cors(self.server.cors.clone())
            .sse_keep_alive(Duration::from_secs(self.server.sse_keep_alive_secs.max(1)))
            .placeholder_size(self.server.placeholder_width, self.server.placeholder_height);
        config.placeholder_quality = self.server.jpeg_quality;
        Ok(config)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        let pacing = &self.pacing;
        let backoff = Duration::from_millis(pacing.retry_backoff_ms);

        let mut config = CoordinatorConfig::default()
            .codec(CodecParams {
                display_width: self.display.width.max(1),
                display_height: self.display.height.max(1),
                jpeg_quality: self.server.jpeg_quality,
            })
            .profile(
                ConsumerKind::Display,
                LoopProfile::display()
                    .interval(Duration::from_millis(pacing.display_interval_ms))
                    .retries(pacing.pull_retries, backoff),
            )
            .profile(
                ConsumerKind::Stream,
                LoopProfile::stream()
                    .interval(Duration::from_millis(pacing.stream_interval_ms))
                    .retries(pacing.pull_retries, backoff)
                    .channel_capacity(pacing.stream_buffer),
            )
            .profile(
                ConsumerKind::Event,
                LoopProfile::event()
                    .sink_ready(Duration::from_millis(pacing.event_min_interval_ms))
                    .retries(pacing.pull_retries, backoff),
            )
            .health(self.health_config());

        if !self.display.enabled {
            config = config.headless();
        }
        config
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig::default()
            .interval(Duration::from_secs(self.health.interval_secs.max(1)))
            .timeout(Duration::from_secs(self.health.timeout_secs.max(1)))
            .failure_threshold(self.health.failure_threshold)
    }

    /// Build the configured health probe
    pub fn probe(&self, source: Arc<dyn FrameSource>) -> Arc<dyn HealthProbe> {
        match self.health.probe {
            ProbeKind::Device => Arc::new(SourceProbe::new(source)),
            ProbeKind::Tcp => Arc::new(TcpProbe::new(
                self.health.target.clone(),
                Duration::from_secs(self.health.timeout_secs.max(1)),
            )),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.buttons.debounce_ms)
    }
}
