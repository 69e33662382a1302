//! Status snapshots served to control surfaces

use serde::Serialize;

use crate::consumer::{ConsumerHandle, ConsumerInfo, ConsumerKind};

use super::monitor::HealthMonitor;

/// Aggregated streaming and health state
///
/// The serialized field set is stable; remote clients depend on it.
/// Per-consumer details are available through `consumers` but are not part
/// of the JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub streaming: bool,
    pub lcd_streaming: bool,
    pub web_streaming: bool,
    pub active_clients: usize,
    pub network_stable: bool,
    pub network_failed_checks: u32,
    #[serde(skip)]
    pub consumers: Vec<ConsumerInfo>,
}

impl HealthStatus {
    /// Build a snapshot from the session flag, the live handle set and the
    /// health monitor
    pub fn collect(streaming: bool, handles: &[ConsumerHandle], health: &HealthMonitor) -> Self {
        let active = || handles.iter().filter(|h| h.is_active());

        let lcd_streaming = streaming && active().any(|h| h.kind() == ConsumerKind::Display);
        let active_clients = if streaming {
            active().filter(|h| h.kind().is_web()).count()
        } else {
            0
        };

        Self {
            streaming,
            lcd_streaming,
            web_streaming: active_clients > 0,
            active_clients,
            network_stable: health.is_stable(),
            network_failed_checks: health.failed_checks(),
            consumers: handles.iter().map(ConsumerHandle::info).collect(),
        }
    }
}

/// Detailed health-check state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStatus {
    pub network_stable: bool,
    pub failed_checks: u32,
    pub max_failed_checks: u32,
    pub total_checks: u64,
    pub check_interval_secs: f64,
    /// `None` before the first check
    pub last_check_secs_ago: Option<f64>,
    /// Probe label (`device`, `tcp`, ...)
    pub probe: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_status() {
        let health = HealthMonitor::new(3);
        let status = HealthStatus::collect(false, &[], &health);

        assert!(!status.streaming);
        assert!(!status.lcd_streaming);
        assert!(!status.web_streaming);
        assert_eq!(status.active_clients, 0);
        assert!(status.network_stable);
    }

    #[test]
    fn test_counts_only_active_web_consumers() {
        let health = HealthMonitor::new(3);
        let display = ConsumerHandle::new(1, ConsumerKind::Display);
        let stream = ConsumerHandle::new(2, ConsumerKind::Stream);
        let events = ConsumerHandle::new(3, ConsumerKind::Event);
        let exited = ConsumerHandle::new(4, ConsumerKind::Stream);
        exited.mark_exited();

        let status = HealthStatus::collect(true, &[display, stream, events, exited], &health);

        assert!(status.lcd_streaming);
        assert!(status.web_streaming);
        assert_eq!(status.active_clients, 2);
        assert_eq!(status.consumers.len(), 4);
    }

    #[test]
    fn test_json_field_set_is_stable() {
        let health = HealthMonitor::new(3);
        health.record(false);
        let status = HealthStatus::collect(true, &[ConsumerHandle::new(1, ConsumerKind::Stream)], &health);

        let json = serde_json::to_value(&status).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "active_clients",
                "lcd_streaming",
                "network_failed_checks",
                "network_stable",
                "streaming",
                "web_streaming"
            ]
        );
        assert_eq!(json["network_failed_checks"], 1);
        assert_eq!(json["active_clients"], 1);
    }
}
