//! Local fallback classification
//!
//! Used whenever the scoring service cannot produce a usable verdict.
//! Deterministic: the result depends on the capability alone.

use super::Classification;
use crate::types::{Capability, ClassificationResult, ThreatLevel};
use std::collections::BTreeSet;

/// Capabilities classified high-risk when the service is unavailable
pub const SENSITIVE_CAPABILITIES: &[Capability] = &[
    Capability::Camera,
    Capability::Microphone,
    Capability::CameraMicrophone,
    Capability::Geolocation,
    Capability::Notifications,
    Capability::ScreenCapture,
    Capability::Bluetooth,
    Capability::Usb,
    Capability::ClipboardRead,
];

/// Reason and error info for a sensitive-capability fallback
pub const SENSITIVE_RULE_INFO: &str = "service unavailable, matched sensitive-capability rule";

/// Reason and error info for any other fallback
pub const UNAVAILABLE_INFO: &str = "service unavailable";

/// Layer name recorded on fallback verdicts
pub const FALLBACK_LAYER: &str = "fallback_rule";

/// Neutral score: the fallback has no anomaly estimate of its own
const FALLBACK_ANOMALY_SCORE: f64 = 0.5;

/// Whether a capability is in the sensitive set
///
/// Matches on the normalized name, so an `Other` carrying a known name
/// counts as that capability.
pub fn is_sensitive(capability: &Capability) -> bool {
    SENSITIVE_CAPABILITIES.contains(&Capability::parse(capability.as_str()))
}

/// Classify a capability without the scoring service
pub fn classify(capability: &Capability) -> Classification {
    let (threat_level, info) = if is_sensitive(capability) {
        (ThreatLevel::High, SENSITIVE_RULE_INFO)
    } else {
        (ThreatLevel::Low, UNAVAILABLE_INFO)
    };

    let mut triggered_layers = BTreeSet::new();
    if threat_level != ThreatLevel::Low {
        triggered_layers.insert(FALLBACK_LAYER.to_string());
    }

    Classification {
        result: ClassificationResult {
            threat_level,
            anomaly_score: FALLBACK_ANOMALY_SCORE,
            reason: info.to_string(),
            triggered_layers,
        },
        error_info: Some(info.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sensitive_capability_is_high() {
        for capability in SENSITIVE_CAPABILITIES {
            let c = classify(capability);
            assert_eq!(c.result.threat_level, ThreatLevel::High, "{}", capability);
            assert_eq!(c.error_info.as_deref(), Some(SENSITIVE_RULE_INFO));
            assert!(c.result.triggered_layers.contains(FALLBACK_LAYER));
        }
    }

    #[test]
    fn test_other_capability_is_low_with_annotation() {
        let c = classify(&Capability::parse("storage"));
        assert_eq!(c.result.threat_level, ThreatLevel::Low);
        assert_eq!(c.error_info.as_deref(), Some(UNAVAILABLE_INFO));
        assert!(c.result.triggered_layers.is_empty());
        assert!(c.is_fallback());
    }

    #[test]
    fn test_aliases_match_sensitive_set() {
        assert!(is_sensitive(&Capability::parse("clipboard-read")));
        assert!(is_sensitive(&Capability::parse("location")));
        assert!(!is_sensitive(&Capability::parse("midi")));
    }

    #[test]
    fn test_unnormalized_other_matches_known_capability() {
        let camera = Capability::Other("camera".to_string());
        assert!(is_sensitive(&camera));
        assert_eq!(classify(&camera).result.threat_level, ThreatLevel::High);

        let spaced = Capability::Other("Clipboard Read".to_string());
        assert!(is_sensitive(&spaced));
    }
}
