//! Alert decision engine
//!
//! Maps a classification to an alert action and is the only writer of
//! activity records. The engine owns the [`ActivityStore`] outright; it is
//! driven from a single task, so no lock guards the store.

use crate::classifier::ClassifierClient;
use crate::notify::{Notification, Notifier, PRIORITY_ELEVATED, PRIORITY_STANDARD};
use crate::state::{PersistedState, StateStore};
use crate::store::{ActivityStore, ActivityView};
use crate::types::{ActivityRecord, ClassificationResult, PermissionEvent, ThreatLevel};
use std::sync::Arc;

/// What to do about a classified event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertAction {
    Silent,
    Notify(Notification),
}

impl AlertAction {
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            Self::Silent => None,
            Self::Notify(n) => Some(n),
        }
    }
}

/// Decide the alert for a classified event
///
/// `low` is silent, `medium` and `high` notify at standard priority, and
/// `critical` notifies at elevated priority and stays until dismissed.
pub fn decide(result: &ClassificationResult, event: &PermissionEvent) -> AlertAction {
    let (priority, persistent) = match result.threat_level {
        ThreatLevel::Low => return AlertAction::Silent,
        ThreatLevel::Medium | ThreatLevel::High => (PRIORITY_STANDARD, false),
        ThreatLevel::Critical => (PRIORITY_ELEVATED, true),
    };

    let layers = if result.triggered_layers.is_empty() {
        "none".to_string()
    } else {
        result
            .triggered_layers
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    AlertAction::Notify(Notification {
        title: format!(
            "{} Threat Detected",
            result.threat_level.as_str().to_uppercase()
        ),
        body: format!(
            "Site: {}\nPermission: {}\n\n{}\n\nAnomaly Score: {:.1}%\nDetection Layers: {}",
            event.origin_host,
            event.capability,
            result.reason,
            result.anomaly_score * 100.0,
            layers
        ),
        priority,
        persistent,
    })
}

/// Classifies events, records them, and raises alerts
pub struct DecisionEngine {
    store: ActivityStore,
    classifier: ClassifierClient,
    notifier: Arc<dyn Notifier>,
    state_store: Arc<dyn StateStore>,
    monitoring: bool,
}

impl DecisionEngine {
    /// Create an engine, restoring any previously persisted state
    ///
    /// `monitoring` is the initial flag when nothing has been persisted. A
    /// state that fails to load is logged and the engine starts empty.
    pub fn new(
        capacity: usize,
        classifier: ClassifierClient,
        notifier: Arc<dyn Notifier>,
        state_store: Arc<dyn StateStore>,
        monitoring: bool,
    ) -> Self {
        let mut store = ActivityStore::new(capacity);
        let mut monitoring = monitoring;

        match state_store.load() {
            Ok(Some(state)) => {
                store.restore(state.permission_log);
                monitoring = state.is_monitoring;
                tracing::info!(
                    records = store.len(),
                    monitoring = monitoring,
                    "Restored monitor state"
                );
            }
            Ok(None) => {
                tracing::debug!("No persisted monitor state, starting empty");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load monitor state, starting empty");
            }
        }

        Self {
            store,
            classifier,
            notifier,
            state_store,
            monitoring,
        }
    }

    /// Classify, record, alert, persist
    ///
    /// Returns the appended record, or `None` when monitoring is off.
    pub async fn handle_event(&mut self, event: PermissionEvent) -> Option<Arc<ActivityRecord>> {
        if !self.monitoring {
            tracing::debug!(
                request_id = %event.request_id,
                capability = %event.capability,
                "Monitoring disabled, event dropped"
            );
            return None;
        }

        let classification = self.classifier.classify(&event).await;
        let action = decide(&classification.result, &event);

        let record = self.store.append(ActivityRecord::new(
            event,
            Some(classification.result),
            classification.error_info,
        ));

        tracing::info!(
            request_id = %record.event.request_id,
            capability = %record.event.capability,
            state = %record.event.state,
            host = %record.event.origin_host,
            threat_level = ?record.threat_level(),
            fallback = record.error_info.is_some(),
            "Permission activity recorded"
        );

        if let AlertAction::Notify(notification) = action {
            self.notifier.notify(notification);
        }

        self.flush();
        Some(record)
    }

    /// Turn monitoring on or off and persist the flag
    pub fn set_monitoring(&mut self, enabled: bool) {
        if self.monitoring != enabled {
            tracing::info!(enabled = enabled, "Monitoring toggled");
        }
        self.monitoring = enabled;
        self.flush();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    /// Write current state to the state store
    ///
    /// Failures are logged; returns whether the write succeeded.
    pub fn flush(&self) -> bool {
        let state = PersistedState::capture(&self.store, self.monitoring);
        match self.state_store.save(&state) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    records = state.permission_log.len(),
                    "Failed to persist monitor state"
                );
                false
            }
        }
    }

    pub fn store(&self) -> &ActivityStore {
        &self.store
    }

    /// Read-only handle for other contexts
    pub fn view(&self) -> ActivityView {
        self.store.view()
    }
}
