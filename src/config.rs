//! Monitor configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::error::{Result, WatchError};
use crate::types::Decision;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides the scoring service base URL
pub const ENV_SCORING_URL: &str = "PERMWATCH_SCORING_URL";

/// Overrides the state file path
pub const ENV_STATE_PATH: &str = "PERMWATCH_STATE_PATH";

/// Default activity log capacity
pub const DEFAULT_CAPACITY: usize = 500;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchConfig {
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
    pub confirmation: ConfirmationConfig,
    pub relay: RelayConfig,
    /// Initial monitoring flag when no persisted state exists
    pub monitoring_enabled: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            store: StoreConfig::default(),
            confirmation: ConfirmationConfig::default(),
            relay: RelayConfig::default(),
            monitoring_enabled: true,
        }
    }
}

impl WatchConfig {
    /// Parse a JSON configuration string
    pub fn from_json(content: &str) -> Result<Self> {
        let config: WatchConfig = serde_json::from_str(content)
            .map_err(|e| WatchError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WatchError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    /// Apply `PERMWATCH_*` environment overrides
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var(ENV_SCORING_URL) {
            if !url.trim().is_empty() {
                self.scoring.base_url = url;
            }
        }
        if let Ok(path) = std::env::var(ENV_STATE_PATH) {
            if !path.trim().is_empty() {
                self.store.state_path = Some(PathBuf::from(path));
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scoring.base_url.trim().is_empty() {
            return Err(WatchError::Config("scoring.baseUrl must not be empty".to_string()));
        }
        if self.scoring.timeout_secs == 0 {
            return Err(WatchError::Config("scoring.timeoutSecs must be > 0".to_string()));
        }
        if self.store.capacity == 0 {
            return Err(WatchError::Config("store.capacity must be > 0".to_string()));
        }
        if self.confirmation.timeout_secs == 0 {
            return Err(WatchError::Config(
                "confirmation.timeoutSecs must be > 0".to_string(),
            ));
        }
        if self.relay.buffer == 0 {
            return Err(WatchError::Config("relay.buffer must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Scoring service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringConfig {
    pub base_url: String,
    /// Bound on one classification round trip
    pub timeout_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 5,
        }
    }
}

/// Activity store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub capacity: usize,
    /// JSON state file; in-memory state when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            state_path: None,
        }
    }
}

/// Confirmation protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
    /// Decision applied when a confirmation times out or faults
    pub fallback: Decision,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            fallback: Decision::Deny,
        }
    }
}

/// Relay channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    /// Bounded channel capacity per boundary
    pub buffer: usize,
    /// Round-trip every message through JSON
    pub serialized: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer: 256,
            serialized: true,
        }
    }
}
