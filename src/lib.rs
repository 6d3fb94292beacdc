//! # a3s-permwatch
//!
//! Capability-use monitoring for untrusted page code.
//!
//! ## Overview
//!
//! `a3s-permwatch` observes when monitored code asks for privacy-sensitive
//! capabilities (camera, microphone, location, clipboard, ...), has each
//! request scored by an external classifier, raises alerts by threat level,
//! and keeps a bounded activity history. Monitoring is transparent: the
//! decorated call resolves exactly as it would without the monitor.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use a3s_permwatch::{Capability, FixedSurface, Decision, PermissionWatcher, TracingNotifier, WatchConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_permwatch::Result<()> {
//! let watcher = PermissionWatcher::from_config(
//!     &WatchConfig::default().apply_env(),
//!     Arc::new(TracingNotifier),
//!     Arc::new(FixedSurface::new(Decision::Deny)),
//! )?;
//!
//! let interceptor = watcher.interceptor_for_url("https://meet.example.com/room")?;
//! let _stream: Result<&str, String> = interceptor
//!     .intercept(Capability::Camera, async { Ok("media stream") })
//!     .await;
//!
//! println!("Recorded: {}", watcher.view().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **CapabilityInterceptor**: async decorator emitting pending/terminal events
//! - **Relay** trait: best-effort, typed transport between contexts
//! - **ClassifierClient**: scoring service call with deterministic fallback
//! - **DecisionEngine**: threat level to alert action; sole record writer
//! - **ActivityStore**: bounded FIFO log with a derived suspicious view
//! - **ConfirmationManager**: id-correlated human allow/deny with timeout
//! - **PermissionWatcher**: spawns the decision context and hands out handles

pub mod classifier;
pub mod config;
pub mod confirmation;
pub mod engine;
pub mod error;
pub mod interceptor;
pub mod notify;
pub mod relay;
pub mod state;
pub mod store;
pub mod types;
pub mod watcher;

// Re-export core types
pub use classifier::{
    Classification, ClassifierClient, HealthStatus, HttpScoringService, ScoringRequest,
    ScoringResponse, ScoringService,
};
pub use config::{ConfirmationConfig, RelayConfig, ScoringConfig, StoreConfig, WatchConfig};
pub use confirmation::{
    ConfirmationManager, ConfirmationOutcome, ConfirmationPrompt, ConfirmationSurface,
    FixedSurface, UnattendedSurface,
};
pub use engine::{decide, AlertAction, DecisionEngine};
pub use error::{Result, WatchError};
pub use interceptor::CapabilityInterceptor;
pub use notify::{MemoryNotifier, Notification, Notifier, TracingNotifier};
pub use relay::{send_or_log, ChannelRelay, ControlMessage, PageMessage, Relay, ReplyMessage};
pub use state::{FileStateStore, MemoryStateStore, PersistedState, StateStore};
pub use store::{ActivityStore, ActivityView, ThreatCounts};
pub use types::{
    ActivityRecord, Capability, ClassificationResult, ConfirmationRequest, ConfirmationResponse,
    Decision, PageOrigin, PermissionEvent, PermissionState, PermissionStatus, ThreatLevel,
};
pub use watcher::{DecisionContext, PermissionWatcher};
