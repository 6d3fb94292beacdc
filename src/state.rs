//! Monitor state persistence
//!
//! Three named entries survive restarts: the bounded activity log, the
//! suspicious subset, and the monitoring flag. The decision engine loads
//! them once at startup and writes them after every mutation.
//!
//! The suspicious entry is a synchronized copy for external readers. It is
//! rebuilt from the activity log on every save and ignored on load.

use crate::error::{Result, WatchError};
use crate::store::ActivityStore;
use crate::types::ActivityRecord;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted monitor state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub permission_log: Vec<ActivityRecord>,

    #[serde(default)]
    pub suspicious_activity: Vec<ActivityRecord>,

    #[serde(default = "default_monitoring")]
    pub is_monitoring: bool,
}

fn default_monitoring() -> bool {
    true
}

impl PersistedState {
    /// Capture the current store contents
    pub fn capture(store: &ActivityStore, is_monitoring: bool) -> Self {
        Self {
            permission_log: store.snapshot().iter().map(|r| (**r).clone()).collect(),
            suspicious_activity: store
                .suspicious_snapshot()
                .iter()
                .map(|r| (**r).clone())
                .collect(),
            is_monitoring,
        }
    }
}

/// Trait for persisting monitor state
pub trait StateStore: Send + Sync {
    /// Save the full state
    fn save(&self, state: &PersistedState) -> Result<()>;

    /// Load the state, `None` if nothing has been saved yet
    fn load(&self) -> Result<Option<PersistedState>>;
}

/// Monitor state kept in a single JSON file
///
/// A save goes to a sibling `.partial` file that then replaces the real one,
/// so a crash mid-save leaves the previous state intact.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn partial_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".partial");
        PathBuf::from(name)
    }

    fn persistence_error(&self, action: &str, e: impl std::fmt::Display) -> WatchError {
        WatchError::Persistence(format!(
            "cannot {} monitor state at {}: {}",
            action,
            self.path.display(),
            e
        ))
    }
}

impl StateStore for FileStateStore {
    fn save(&self, state: &PersistedState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| self.persistence_error("prepare directory for", e))?;
        }

        let partial = self.partial_path();
        std::fs::write(&partial, json).map_err(|e| self.persistence_error("write", e))?;
        std::fs::rename(&partial, &self.path).map_err(|e| self.persistence_error("commit", e))?;

        tracing::debug!(
            path = %self.path.display(),
            log_len = state.permission_log.len(),
            suspicious = state.suspicious_activity.len(),
            monitoring = state.is_monitoring,
            "Monitor state written"
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.persistence_error("read", e)),
        };

        let state: PersistedState =
            serde_json::from_slice(&bytes).map_err(|e| self.persistence_error("decode", e))?;

        tracing::debug!(
            path = %self.path.display(),
            log_len = state.permission_log.len(),
            monitoring = state.is_monitoring,
            "Monitor state read"
        );
        Ok(Some(state))
    }
}

/// In-memory state store for testing
#[derive(Default)]
pub struct MemoryStateStore {
    state: std::sync::RwLock<Option<PersistedState>>,
}

impl MemoryStateStore {
    /// Start with a previously persisted state
    pub fn with_state(state: PersistedState) -> Self {
        Self {
            state: std::sync::RwLock::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, state: &PersistedState) -> Result<()> {
        let mut current = self.state.write().map_err(|e| {
            WatchError::Persistence(format!("monitor state lock poisoned: {}", e))
        })?;
        *current = Some(state.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PersistedState>> {
        let current = self.state.read().map_err(|e| {
            WatchError::Persistence(format!("monitor state lock poisoned: {}", e))
        })?;
        Ok(current.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Capability, ClassificationResult, PageOrigin, PermissionEvent, ThreatLevel,
    };
    use std::collections::BTreeSet;

    fn sample_store() -> ActivityStore {
        let origin = PageOrigin::from_url("https://example.com/").unwrap();
        let mut store = ActivityStore::new(10);
        for level in [ThreatLevel::Low, ThreatLevel::Critical] {
            store.append(ActivityRecord::new(
                PermissionEvent::pending(Capability::Camera, &origin),
                Some(ClassificationResult {
                    threat_level: level,
                    anomaly_score: 0.9,
                    reason: "test".to_string(),
                    triggered_layers: BTreeSet::new(),
                }),
                None,
            ));
        }
        store
    }

    #[test]
    fn test_capture_derives_suspicious_copy() {
        let state = PersistedState::capture(&sample_store(), true);
        assert_eq!(state.permission_log.len(), 2);
        assert_eq!(state.suspicious_activity.len(), 1);
        assert_eq!(
            state.suspicious_activity[0].threat_level(),
            Some(ThreatLevel::Critical)
        );
    }

    #[test]
    fn test_memory_store_save_load() {
        let store = MemoryStateStore::default();
        assert!(store.load().unwrap().is_none());

        let state = PersistedState::capture(&sample_store(), false);
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(!loaded.is_monitoring);
    }

    #[test]
    fn test_file_store_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::new(&path);

        let state = PersistedState::capture(&sample_store(), true);
        store.save(&state).unwrap();
        assert!(path.exists());

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("permissionLog"));
        assert!(content.contains("suspiciousActivity"));
        assert!(content.contains("isMonitoring"));
    }

    #[test]
    fn test_file_store_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("missing.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/state.json");

        let store = FileStateStore::new(&path);
        store.save(&PersistedState::default()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_file_store_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStateStore::new(&path);

        let state = PersistedState::capture(&sample_store(), true);
        store.save(&state).unwrap();
        store.save(&state).unwrap();
        assert!(!dir.path().join("state.json.partial").exists());
    }

    #[test]
    fn test_file_store_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let err = FileStateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, WatchError::Persistence(_)));
        assert!(err.to_string().contains("cannot decode monitor state"));
    }

    #[test]
    fn test_missing_flag_defaults_to_monitoring() {
        let state: PersistedState = serde_json::from_str(r#"{"permissionLog": []}"#).unwrap();
        assert!(state.is_monitoring);
    }
}
