//! Consecutive-failure tracking for the health check

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Health check configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Time between checks
    pub interval: Duration,

    /// A probe that has not answered within this time counts as failed
    pub timeout: Duration,

    /// Consecutive failures before the network is reported unstable
    pub failure_threshold: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(3),
            failure_threshold: 3,
        }
    }
}

impl HealthConfig {
    /// Set check interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set probe timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set failure threshold (minimum 1)
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }
}

/// Rolling health state
///
/// Written by the health task only, read lock-free by status requests.
#[derive(Debug)]
pub struct HealthMonitor {
    threshold: u32,
    failed_checks: AtomicU32,
    stable: AtomicBool,
    total_checks: AtomicU64,
    created_at: Instant,
    /// Milliseconds after `created_at` of the last check, 0 if none yet
    last_check_ms: AtomicU64,
}

impl HealthMonitor {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            threshold: failure_threshold.max(1),
            failed_checks: AtomicU32::new(0),
            stable: AtomicBool::new(true),
            total_checks: AtomicU64::new(0),
            created_at: Instant::now(),
            last_check_ms: AtomicU64::new(0),
        }
    }

    /// Record one check result; returns the resulting stability
    pub fn record(&self, ok: bool) -> bool {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        let elapsed = self.created_at.elapsed().as_millis() as u64;
        self.last_check_ms.store(elapsed.max(1), Ordering::Relaxed);

        if ok {
            self.failed_checks.store(0, Ordering::Relaxed);
            self.stable.store(true, Ordering::Release);
            true
        } else {
            let failed = self.failed_checks.fetch_add(1, Ordering::Relaxed) + 1;
            if failed >= self.threshold {
                self.stable.store(false, Ordering::Release);
            }
            self.is_stable()
        }
    }

    /// Derived network stability signal
    pub fn is_stable(&self) -> bool {
        self.stable.load(Ordering::Acquire)
    }

    /// Current run of consecutive failed checks
    pub fn failed_checks(&self) -> u32 {
        self.failed_checks.load(Ordering::Relaxed)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn total_checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Time since the last check, `None` before the first one
    pub fn since_last_check(&self) -> Option<Duration> {
        match self.last_check_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => {
                let at = self.created_at + Duration::from_millis(ms);
                Some(Instant::now().saturating_duration_since(at))
            }
        }
    }
}
