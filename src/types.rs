//! Core domain types for the permission monitor
//!
//! All persisted types use camelCase JSON serialization. Capability names
//! travel as snake_case strings.

use crate::error::{Result, WatchError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A privacy-sensitive platform capability
///
/// Known capabilities have dedicated variants; anything else is carried
/// verbatim (normalized) in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    Camera,
    Microphone,
    /// Combined audio + video capture request
    CameraMicrophone,
    Geolocation,
    Notifications,
    ScreenCapture,
    Bluetooth,
    Usb,
    ClipboardRead,
    /// Any capability outside the known set (e.g. "storage", "midi")
    Other(String),
}

impl Capability {
    /// Parse a capability name leniently
    ///
    /// Accepts hyphenated, spaced, and `+`-joined spellings, plus the
    /// short names page hooks emit (`location`, `notification`).
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| match c {
                '-' | ' ' | '+' => '_',
                other => other,
            })
            .collect();

        match normalized.as_str() {
            "camera" | "video" => Self::Camera,
            "microphone" | "mic" | "audio" => Self::Microphone,
            "camera_microphone" | "camera_and_microphone" | "microphone_camera" => {
                Self::CameraMicrophone
            }
            "geolocation" | "location" => Self::Geolocation,
            "notifications" | "notification" => Self::Notifications,
            "screen_capture" | "display_capture" => Self::ScreenCapture,
            "bluetooth" => Self::Bluetooth,
            "usb" => Self::Usb,
            "clipboard_read" => Self::ClipboardRead,
            _ => Self::Other(normalized),
        }
    }

    /// Map a media-capture request to the capability it touches
    pub fn from_media_constraints(video: bool, audio: bool) -> Self {
        match (video, audio) {
            (true, true) => Self::CameraMicrophone,
            (true, false) => Self::Camera,
            _ => Self::Microphone,
        }
    }

    /// Canonical snake_case wire name
    pub fn as_str(&self) -> &str {
        match self {
            Self::Camera => "camera",
            Self::Microphone => "microphone",
            Self::CameraMicrophone => "camera_microphone",
            Self::Geolocation => "geolocation",
            Self::Notifications => "notifications",
            Self::ScreenCapture => "screen_capture",
            Self::Bluetooth => "bluetooth",
            Self::Usb => "usb",
            Self::ClipboardRead => "clipboard_read",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.as_str().to_string()
    }
}

/// Lifecycle state of a permission event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Request observed, underlying call not yet resolved
    Pending,
    /// Underlying call resolved successfully
    Granted,
    /// Underlying call failed or was refused
    Denied,
    /// Push-driven status change, no pending precursor
    Changed,
}

impl PermissionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Changed => "changed",
        }
    }

    /// Whether no further transition is allowed out of this state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// Only `pending -> {granted, denied}` is a valid transition.
    pub fn can_transition_to(&self, next: PermissionState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Granted) | (Self::Pending, Self::Denied)
        )
    }
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grant status reported by a push-style status source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Prompt,
}

/// Where a monitored page lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOrigin {
    /// Hostname only, without scheme or port
    pub host: String,
    /// Full page URL
    pub url: String,
}

impl PageOrigin {
    /// Derive the origin from a page URL
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| WatchError::Config(format!("Invalid page URL '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| WatchError::Config(format!("Page URL '{}' has no host", url)))?;
        Ok(Self {
            host: host.to_string(),
            url: url.to_string(),
        })
    }
}

/// A single observed capability request or status change
///
/// Events are immutable: a terminal event is a new value derived from its
/// pending precursor via [`PermissionEvent::resolve`], sharing the same
/// `request_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEvent {
    /// Identifier of the logical call (req-<uuid>)
    pub request_id: String,

    pub capability: Capability,

    pub origin_host: String,

    pub url: String,

    /// When the logical call was made
    pub requested_at: DateTime<Utc>,

    pub state: PermissionState,

    /// Observed status, set only on `changed` events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PermissionStatus>,
}

impl PermissionEvent {
    /// Create a `pending` event for a new logical call
    pub fn pending(capability: Capability, origin: &PageOrigin) -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            capability,
            origin_host: origin.host.clone(),
            url: origin.url.clone(),
            requested_at: Utc::now(),
            state: PermissionState::Pending,
            status: None,
        }
    }

    /// Create a push-driven `changed` event
    pub fn changed(capability: Capability, origin: &PageOrigin, status: PermissionStatus) -> Self {
        Self {
            request_id: format!("req-{}", uuid::Uuid::new_v4()),
            capability,
            origin_host: origin.host.clone(),
            url: origin.url.clone(),
            requested_at: Utc::now(),
            state: PermissionState::Changed,
            status: Some(status),
        }
    }

    /// Derive the event for a new state, enforcing monotonic transitions
    pub fn transition(&self, next: PermissionState) -> Result<Self> {
        if !self.state.can_transition_to(next) {
            return Err(WatchError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        Ok(Self {
            state: next,
            ..self.clone()
        })
    }

    /// Derive the terminal `granted` / `denied` event for this call
    pub fn resolve(&self, granted: bool) -> Result<Self> {
        self.transition(if granted {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        })
    }
}

/// Ordinal risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    #[serde(alias = "LOW", alias = "Low")]
    Low,
    #[serde(alias = "MEDIUM", alias = "Medium")]
    Medium,
    #[serde(alias = "HIGH", alias = "High")]
    High,
    #[serde(alias = "CRITICAL", alias = "Critical")]
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// High and critical records make up the suspicious subset
    pub fn is_suspicious(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk verdict for one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub threat_level: ThreatLevel,

    /// Continuous risk estimate in [0, 1]
    pub anomaly_score: f64,

    pub reason: String,

    /// Detection layers that fired (e.g. "rule_based", "fallback_rule")
    #[serde(default)]
    pub triggered_layers: BTreeSet<String>,
}

/// One entry in the activity log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub event: PermissionEvent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification: Option<ClassificationResult>,

    /// Set when the classification came from the local fallback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_info: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

impl ActivityRecord {
    pub(crate) fn new(
        event: PermissionEvent,
        classification: Option<ClassificationResult>,
        error_info: Option<String>,
    ) -> Self {
        Self {
            event,
            classification,
            error_info,
            recorded_at: Utc::now(),
        }
    }

    pub fn threat_level(&self) -> Option<ThreatLevel> {
        self.classification.as_ref().map(|c| c.threat_level)
    }

    pub fn is_suspicious(&self) -> bool {
        self.threat_level().is_some_and(|level| level.is_suspicious())
    }
}

/// A human allow/deny decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn from_bool(allow: bool) -> Self {
        if allow {
            Self::Allow
        } else {
            Self::Deny
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Request for a human decision, correlated by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    /// Unique token (cfm-<uuid>)
    pub id: String,
    pub app_name: String,
    pub capability: Capability,
    pub risk_summary: String,
}

/// Human answer to a [`ConfirmationRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    pub id: String,
    pub decision: Decision,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> PageOrigin {
        PageOrigin::from_url("https://meet.example.com:8443/room/42").unwrap()
    }

    #[test]
    fn test_capability_parse_aliases() {
        assert_eq!(Capability::parse("location"), Capability::Geolocation);
        assert_eq!(Capability::parse("notification"), Capability::Notifications);
        assert_eq!(Capability::parse("camera+microphone"), Capability::CameraMicrophone);
        assert_eq!(
            Capability::parse("camera_and_microphone"),
            Capability::CameraMicrophone
        );
        assert_eq!(Capability::parse("Clipboard-Read"), Capability::ClipboardRead);
        assert_eq!(Capability::parse("screen-capture"), Capability::ScreenCapture);
        assert_eq!(
            Capability::parse("storage"),
            Capability::Other("storage".to_string())
        );
    }

    #[test]
    fn test_capability_serde_uses_snake_case() {
        let json = serde_json::to_string(&Capability::ClipboardRead).unwrap();
        assert_eq!(json, "\"clipboard_read\"");

        let parsed: Capability = serde_json::from_str("\"camera-microphone\"").unwrap();
        assert_eq!(parsed, Capability::CameraMicrophone);
    }

    #[test]
    fn test_capability_from_media_constraints() {
        assert_eq!(
            Capability::from_media_constraints(true, true),
            Capability::CameraMicrophone
        );
        assert_eq!(Capability::from_media_constraints(true, false), Capability::Camera);
        assert_eq!(
            Capability::from_media_constraints(false, true),
            Capability::Microphone
        );
    }

    #[test]
    fn test_page_origin_strips_port_and_path() {
        let origin = origin();
        assert_eq!(origin.host, "meet.example.com");
        assert_eq!(origin.url, "https://meet.example.com:8443/room/42");
    }

    #[test]
    fn test_page_origin_rejects_garbage() {
        assert!(matches!(
            PageOrigin::from_url("not a url"),
            Err(WatchError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_keeps_request_identity() {
        let pending = PermissionEvent::pending(Capability::Geolocation, &origin());
        let granted = pending.resolve(true).unwrap();

        assert_eq!(granted.request_id, pending.request_id);
        assert_eq!(granted.requested_at, pending.requested_at);
        assert_eq!(granted.state, PermissionState::Granted);
        assert_eq!(pending.state, PermissionState::Pending);
    }

    #[test]
    fn test_terminal_events_are_immutable() {
        let pending = PermissionEvent::pending(Capability::Camera, &origin());
        let denied = pending.resolve(false).unwrap();

        let err = denied.resolve(true).unwrap_err();
        assert!(matches!(err, WatchError::InvalidTransition { .. }));
        assert!(denied.transition(PermissionState::Pending).is_err());
    }

    #[test]
    fn test_changed_has_no_precursor() {
        let changed = PermissionEvent::changed(
            Capability::Microphone,
            &origin(),
            PermissionStatus::Denied,
        );
        assert_eq!(changed.state, PermissionState::Changed);
        assert!(changed.state.is_terminal());
        assert!(changed.resolve(true).is_err());
        assert_eq!(changed.status, Some(PermissionStatus::Denied));
    }

    #[test]
    fn test_threat_level_accepts_uppercase() {
        let level: ThreatLevel = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(level, ThreatLevel::Critical);
        assert!(level.is_suspicious());
        assert!(!ThreatLevel::Medium.is_suspicious());
        assert!(ThreatLevel::Low < ThreatLevel::Critical);
    }

    #[test]
    fn test_record_suspicious_requires_classification() {
        let event = PermissionEvent::pending(Capability::Camera, &origin());
        let unclassified = ActivityRecord::new(event.clone(), None, None);
        assert!(!unclassified.is_suspicious());

        let high = ActivityRecord::new(
            event,
            Some(ClassificationResult {
                threat_level: ThreatLevel::High,
                anomaly_score: 0.8,
                reason: "test".to_string(),
                triggered_layers: BTreeSet::new(),
            }),
            None,
        );
        assert!(high.is_suspicious());
    }

    #[test]
    fn test_event_json_is_camel_case() {
        let event = PermissionEvent::pending(Capability::Usb, &origin());
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("requestId").is_some());
        assert!(value.get("originHost").is_some());
        assert_eq!(value["state"], "pending");
        assert!(value.get("status").is_none());
    }
}
