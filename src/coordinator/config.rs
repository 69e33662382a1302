//! Coordinator configuration

use crate::codec::CodecParams;
use crate::consumer::{ConsumerKind, LoopProfile};
use crate::health::HealthConfig;

/// Configuration for the stream coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Spawn the display loop when a session starts
    pub display_enabled: bool,

    /// Encoding parameters shared by every consumer
    pub codec: CodecParams,

    /// Display loop profile
    pub display_profile: LoopProfile,

    /// MJPEG client loop profile
    pub stream_profile: LoopProfile,

    /// SSE client loop profile
    pub event_profile: LoopProfile,

    /// Health check settings
    pub health: HealthConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            display_enabled: true,
            codec: CodecParams::default(),
            display_profile: LoopProfile::display(),
            stream_profile: LoopProfile::stream(),
            event_profile: LoopProfile::event(),
            health: HealthConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Profile used for loops of `kind`
    pub fn profile_for(&self, kind: ConsumerKind) -> &LoopProfile {
        match kind {
            ConsumerKind::Display => &self.display_profile,
            ConsumerKind::Stream => &self.stream_profile,
            ConsumerKind::Event => &self.event_profile,
        }
    }

    /// Run without driving the local display
    pub fn headless(mut self) -> Self {
        self.display_enabled = false;
        self
    }

    /// Set encoding parameters
    pub fn codec(mut self, codec: CodecParams) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the profile for one consumer kind
    pub fn profile(mut self, kind: ConsumerKind, profile: LoopProfile) -> Self {
        match kind {
            ConsumerKind::Display => self.display_profile = profile,
            ConsumerKind::Stream => self.stream_profile = profile,
            ConsumerKind::Event => self.event_profile = profile,
        }
        self
    }

    /// Set health check settings
    pub fn health(mut self, health: HealthConfig) -> Self {
        self.health = health;
        self
    }
}
