//! Threat classifier client
//!
//! Turns a permission event into a classification by asking an external
//! scoring service once. Any failure (transport, non-2xx, malformed body)
//! is absorbed here and replaced by the deterministic local fallback; the
//! fallback is marked through `error_info` so it can be told apart from a
//! genuine service verdict.

pub mod fallback;
pub mod http;

pub use http::HttpScoringService;

use crate::error::{Result, WatchError};
use crate::types::{ClassificationResult, PermissionEvent, ThreatLevel};
use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Request body sent to the scoring service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRequest {
    /// Origin host of the requesting page
    pub app_name: String,
    pub permission_type: String,
    /// RFC 3339 timestamp of the request
    pub timestamp: String,
    pub url: String,
}

impl ScoringRequest {
    pub fn from_event(event: &PermissionEvent) -> Self {
        Self {
            app_name: event.origin_host.clone(),
            permission_type: event.capability.as_str().to_string(),
            timestamp: event
                .requested_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            url: event.url.clone(),
        }
    }
}

/// Verdict returned by the scoring service
///
/// Unknown fields (`ml_prediction`, `confidence`, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringResponse {
    pub threat_level: ThreatLevel,
    pub anomaly_score: f64,
    pub reason: String,
    #[serde(default)]
    pub layers_triggered: Vec<String>,
}

impl ScoringResponse {
    /// Reject verdicts whose score is outside [0, 1]
    pub fn validate(&self) -> Result<()> {
        if !self.anomaly_score.is_finite() || !(0.0..=1.0).contains(&self.anomaly_score) {
            return Err(WatchError::Parse(format!(
                "anomaly_score {} is outside [0, 1]",
                self.anomaly_score
            )));
        }
        Ok(())
    }

    pub fn into_result(self) -> ClassificationResult {
        ClassificationResult {
            threat_level: self.threat_level,
            anomaly_score: self.anomaly_score,
            reason: self.reason,
            triggered_layers: self.layers_triggered.into_iter().collect(),
        }
    }
}

/// Liveness check answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// External scoring collaborator
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Score one request (single attempt)
    async fn classify(&self, request: &ScoringRequest) -> Result<ScoringResponse>;

    /// Liveness check
    async fn health(&self) -> Result<HealthStatus>;

    /// Service name, used in logs
    fn name(&self) -> &str;
}

/// Classification plus the observability annotation for fallbacks
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub result: ClassificationResult,
    /// `None` for service verdicts, the fallback rule otherwise
    pub error_info: Option<String>,
}

impl Classification {
    pub fn is_fallback(&self) -> bool {
        self.error_info.is_some()
    }
}

/// Classifier client with local fallback
#[derive(Clone)]
pub struct ClassifierClient {
    service: Arc<dyn ScoringService>,
}

impl ClassifierClient {
    pub fn new(service: Arc<dyn ScoringService>) -> Self {
        Self { service }
    }

    /// Classify an event; never fails
    pub async fn classify(&self, event: &PermissionEvent) -> Classification {
        let request = ScoringRequest::from_event(event);

        match self.service.classify(&request).await {
            Ok(response) => {
                tracing::debug!(
                    request_id = %event.request_id,
                    capability = %event.capability,
                    threat_level = %response.threat_level,
                    anomaly_score = response.anomaly_score,
                    "Scoring service verdict"
                );
                Classification {
                    result: response.into_result(),
                    error_info: None,
                }
            }
            Err(e) => {
                let classification = fallback::classify(&event.capability);
                tracing::warn!(
                    request_id = %event.request_id,
                    capability = %event.capability,
                    service = %self.service.name(),
                    error = %e,
                    threat_level = %classification.result.threat_level,
                    "Scoring service unavailable, using fallback classification"
                );
                classification
            }
        }
    }

    /// Log the scoring service liveness; never fails
    pub async fn health_check(&self) -> Option<HealthStatus> {
        match self.service.health().await {
            Ok(status) => {
                if status.model_loaded {
                    tracing::info!(service = %self.service.name(), "Scoring service ready, model loaded");
                } else {
                    tracing::warn!(service = %self.service.name(), "Scoring service up, model not loaded");
                }
                Some(status)
            }
            Err(e) => {
                tracing::warn!(
                    service = %self.service.name(),
                    error = %e,
                    "Scoring service unreachable, fallback classification will be used"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, PageOrigin};
    use std::sync::Mutex;

    /// Scoring service returning a canned answer and recording requests
    struct CannedService {
        answer: fn() -> Result<ScoringResponse>,
        seen: Mutex<Vec<ScoringRequest>>,
    }

    impl CannedService {
        fn new(answer: fn() -> Result<ScoringResponse>) -> Self {
            Self {
                answer,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ScoringService for CannedService {
        async fn classify(&self, request: &ScoringRequest) -> Result<ScoringResponse> {
            self.seen.lock().unwrap().push(request.clone());
            (self.answer)()
        }

        async fn health(&self) -> Result<HealthStatus> {
            Err(WatchError::Transport("down".to_string()))
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    fn event(capability: Capability) -> PermissionEvent {
        let origin = PageOrigin::from_url("https://calc.example.net/app").unwrap();
        PermissionEvent::pending(capability, &origin)
    }

    #[test]
    fn test_request_from_event() {
        let event = event(Capability::CameraMicrophone);
        let request = ScoringRequest::from_event(&event);

        assert_eq!(request.app_name, "calc.example.net");
        assert_eq!(request.permission_type, "camera_microphone");
        assert_eq!(request.url, "https://calc.example.net/app");
        assert!(request.timestamp.ends_with('Z'));
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let response: ScoringResponse = serde_json::from_value(serde_json::json!({
            "threat_level": "high",
            "anomaly_score": 0.7,
            "reason": "Permission at 3:00",
            "layers_triggered": ["rule_based"],
            "ml_prediction": -1,
            "confidence": 0.3
        }))
        .unwrap();

        assert_eq!(response.threat_level, ThreatLevel::High);
        let result = response.into_result();
        assert!(result.triggered_layers.contains("rule_based"));
    }

    #[test]
    fn test_response_score_out_of_range() {
        let response = ScoringResponse {
            threat_level: ThreatLevel::Low,
            anomaly_score: 1.5,
            reason: String::new(),
            layers_triggered: vec![],
        };
        assert!(matches!(response.validate(), Err(WatchError::Parse(_))));

        let nan = ScoringResponse {
            anomaly_score: f64::NAN,
            ..response
        };
        assert!(nan.validate().is_err());
    }

    #[tokio::test]
    async fn test_service_verdict_has_no_error_info() {
        let service = Arc::new(CannedService::new(|| {
            Ok(ScoringResponse {
                threat_level: ThreatLevel::Low,
                anomaly_score: 0.1,
                reason: "Normal pattern".to_string(),
                layers_triggered: vec![],
            })
        }));
        let client = ClassifierClient::new(service.clone());

        let c = client.classify(&event(Capability::Camera)).await;
        assert_eq!(c.result.threat_level, ThreatLevel::Low);
        assert!(!c.is_fallback());
        assert_eq!(service.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_uses_sensitive_fallback() {
        let client = ClassifierClient::new(Arc::new(CannedService::new(|| {
            Err(WatchError::Transport("connection refused".to_string()))
        })));

        let c = client.classify(&event(Capability::ClipboardRead)).await;
        assert_eq!(c.result.threat_level, ThreatLevel::High);
        assert_eq!(c.error_info.as_deref(), Some(fallback::SENSITIVE_RULE_INFO));
    }

    #[tokio::test]
    async fn test_parse_error_uses_low_fallback() {
        let service = Arc::new(CannedService::new(|| {
            Err(WatchError::Parse("expected value".to_string()))
        }));
        let client = ClassifierClient::new(service.clone());

        let c = client.classify(&event(Capability::parse("storage"))).await;
        assert_eq!(c.result.threat_level, ThreatLevel::Low);
        assert_eq!(c.error_info.as_deref(), Some(fallback::UNAVAILABLE_INFO));
        // single attempt, no retry
        assert_eq!(service.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_health_check_never_fails() {
        let client = ClassifierClient::new(Arc::new(CannedService::new(|| {
            Err(WatchError::Transport("down".to_string()))
        })));
        assert!(client.health_check().await.is_none());
    }
}
