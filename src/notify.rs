//! Notification surface
//!
//! Rendering notifications is left to the host; this module defines the
//! structured payload and the `Notifier` seam it is delivered through.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Standard notification priority
pub const PRIORITY_STANDARD: u8 = 1;

/// Elevated notification priority
pub const PRIORITY_ELEVATED: u8 = 2;

/// A user-visible notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// 1 = standard, 2 = elevated
    pub priority: u8,
    /// Must be dismissed by the user
    pub persistent: bool,
}

impl Notification {
    /// Notification shown from the capture context when the monitor is unreachable
    pub fn degraded(capability: &str) -> Self {
        Self {
            title: "Permission Detected".to_string(),
            body: format!("{} requested (monitor unavailable)", capability),
            priority: PRIORITY_STANDARD,
            persistent: false,
        }
    }
}

/// Sink for notifications
///
/// Implementations must not block; a failure to display is the host's
/// concern and is not reported back into the pipeline.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) {
        tracing::info!(
            title = %notification.title,
            priority = notification.priority,
            persistent = notification.persistent,
            "Notification"
        );
    }
}

/// Notifier that keeps every notification in memory
///
/// Cloning shares the underlying buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications delivered so far, oldest first
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&self, notification: Notification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
