//! Health checks and status reporting
//!
//! A recurring probe, on its own timer, feeds the [`HealthMonitor`].
//! Enough consecutive failures flip `network_stable` to false; one success
//! flips it back. The signal is advisory: remote clients use it to warn or
//! back off, and nothing here ever stops a session.

pub mod monitor;
pub mod probe;
pub mod status;

pub use monitor::{HealthConfig, HealthMonitor};
pub use probe::{HealthProbe, SourceProbe, TcpProbe};
pub use status::{HealthStatus, NetworkStatus};
