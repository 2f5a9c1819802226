//! Liveness state shared between the delivery path and whatever probes the
//! process (readiness endpoint, supervisor, test harness). Held as an owned
//! handle rather than process-global state so independent pipelines report
//! independently.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cheap-to-clone healthy/unhealthy flag. Starts unhealthy until the
/// pipeline's first successful setup flips it.
#[derive(Clone, Debug)]
pub struct HealthState {
    healthy: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            healthy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }

    pub fn get(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}
