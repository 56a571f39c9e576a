use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};

/// Turns away unprivileged requests while an archive is being downloaded or
/// installed. Engaging returns a guard; the gate opens again once every guard
/// is dropped.
#[derive(Debug, Clone)]
pub struct MaintenanceGate {
    active: Arc<AtomicUsize>,
    message: Arc<str>,
}

impl MaintenanceGate {
    pub fn new(site_name: &str) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            message: format!(
                "{site_name} is under maintenance. We are performing a scheduled maintenance. \
                 We will be back online shortly!"
            )
            .into(),
        }
    }

    #[must_use]
    pub fn engage(&self) -> MaintenanceGuard {
        if self.active.fetch_add(1, Ordering::SeqCst) == 0 {
            info!("Maintenance mode on");
        }
        MaintenanceGuard {
            active: Arc::clone(&self.active),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// The message to halt with, or `None` when the request may proceed.
    #[must_use]
    pub fn check(&self, privileged: bool) -> Option<&str> {
        if privileged || !self.is_active() {
            return None;
        }
        debug!("Turning away unprivileged request during maintenance");
        Some(&self.message)
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[must_use = "maintenance ends as soon as the guard is dropped"]
pub struct MaintenanceGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for MaintenanceGuard {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            info!("Maintenance mode off");
        }
    }
}
