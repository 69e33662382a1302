//! Liveness probes

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::frame::FrameSource;

/// One liveness check
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// `true` if the checked resource is reachable
    async fn check(&self) -> bool;

    /// Short label for status output
    fn name(&self) -> &str;
}

/// Asks the capture device whether it is alive
pub struct SourceProbe {
    source: Arc<dyn FrameSource>,
}

impl SourceProbe {
    pub fn new(source: Arc<dyn FrameSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl HealthProbe for SourceProbe {
    async fn check(&self) -> bool {
        self.source.probe().await
    }

    fn name(&self) -> &str {
        "device"
    }
}

/// Opens a TCP connection to a well-known host (e.g. a public DNS server)
pub struct TcpProbe {
    target: String,
    connect_timeout: Duration,
}

impl TcpProbe {
    pub fn new(target: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            target: target.into(),
            connect_timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> bool {
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.target)).await,
            Ok(Ok(_))
        )
    }

    fn name(&self) -> &str {
        "tcp"
    }
}
