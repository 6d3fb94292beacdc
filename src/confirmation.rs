//! Human-in-the-loop confirmation over the context relay.
//!
//! The origin context creates a request with a fresh id, dispatches it over
//! the page relay, and waits. A reply carrying the same id resolves that
//! request and no other. A request that is not answered in time, or whose
//! reply path breaks first, resolves to the caller-supplied fallback.
//!
//! ```text
//! CREATED -> AWAITING_REPLY -> RESOLVED | TIMED_OUT | FAULTED
//! ```

use crate::config::ConfirmationConfig;
use crate::error::{Result, WatchError};
use crate::relay::{send_or_log, PageMessage, Relay, ReplyMessage};
use crate::types::{Capability, ConfirmationRequest, ConfirmationResponse, Decision};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How a confirmation request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// A matching reply arrived
    Resolved(Decision),
    /// No reply within the bound; carries the fallback
    TimedOut(Decision),
    /// Dispatch or reply path failed first; carries the fallback
    Faulted(Decision),
}

impl ConfirmationOutcome {
    /// The decision to act on
    pub fn decision(&self) -> Decision {
        match self {
            Self::Resolved(d) | Self::TimedOut(d) | Self::Faulted(d) => *d,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }
}

/// Origin-side confirmation manager
///
/// Tracks outstanding requests keyed by id and matches incoming replies to
/// them.
pub struct ConfirmationManager {
    relay: Arc<dyn Relay<PageMessage>>,
    /// Outstanding requests keyed by confirmation id
    pending: Mutex<HashMap<String, oneshot::Sender<Decision>>>,
    timeout: Duration,
    fallback: Decision,
    /// Set once the reply channel has closed
    replies_closed: AtomicBool,
}

impl ConfirmationManager {
    pub fn new(relay: Arc<dyn Relay<PageMessage>>, timeout: Duration, fallback: Decision) -> Self {
        Self {
            relay,
            pending: Mutex::new(HashMap::new()),
            timeout,
            fallback,
            replies_closed: AtomicBool::new(false),
        }
    }

    pub fn from_config(relay: Arc<dyn Relay<PageMessage>>, config: &ConfirmationConfig) -> Self {
        Self::new(relay, Duration::from_secs(config.timeout_secs), config.fallback)
    }

    /// Ask for a decision using the configured fallback
    pub async fn request(
        &self,
        app_name: &str,
        capability: Capability,
        risk_summary: &str,
    ) -> ConfirmationOutcome {
        self.request_with_fallback(app_name, capability, risk_summary, self.fallback)
            .await
    }

    /// Ask for a decision, applying `fallback` on timeout or fault
    pub async fn request_with_fallback(
        &self,
        app_name: &str,
        capability: Capability,
        risk_summary: &str,
        fallback: Decision,
    ) -> ConfirmationOutcome {
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut pending = self.pending.lock().await;
            // run_replies sets the flag before cancel_all takes this lock
            if self.replies_closed.load(Ordering::Acquire) {
                tracing::warn!(app = app_name, "Reply channel closed, confirmation faulted");
                return ConfirmationOutcome::Faulted(fallback);
            }
            let mut id = new_confirmation_id();
            while pending.contains_key(&id) {
                id = new_confirmation_id();
            }
            pending.insert(id.clone(), tx);
            id
        };

        let request = ConfirmationRequest {
            id: id.clone(),
            app_name: app_name.to_string(),
            capability,
            risk_summary: risk_summary.to_string(),
        };

        if !send_or_log(self.relay.as_ref(), PageMessage::Confirm(request), "confirmation request") {
            self.pending.lock().await.remove(&id);
            return ConfirmationOutcome::Faulted(fallback);
        }

        let outcome = match timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => ConfirmationOutcome::Resolved(decision),
            Ok(Err(_)) => {
                tracing::warn!(confirmation_id = %id, "Confirmation reply path closed");
                ConfirmationOutcome::Faulted(fallback)
            }
            Err(_) => {
                tracing::warn!(
                    confirmation_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    fallback = ?fallback,
                    "Confirmation timed out"
                );
                ConfirmationOutcome::TimedOut(fallback)
            }
        };

        self.pending.lock().await.remove(&id);
        outcome
    }

    /// Resolve the request with the response's id
    ///
    /// Returns `false` when no such request is outstanding.
    pub async fn resolve(&self, response: ConfirmationResponse) -> bool {
        let responder = self.pending.lock().await.remove(&response.id);

        match responder {
            Some(responder) => {
                tracing::info!(
                    confirmation_id = %response.id,
                    decision = ?response.decision,
                    "Confirmation resolved"
                );
                responder.send(response.decision).is_ok()
            }
            None => {
                tracing::debug!(
                    confirmation_id = %response.id,
                    "Reply for unknown or finished confirmation ignored"
                );
                false
            }
        }
    }

    /// Consume replies until the channel closes, then fault everything
    pub async fn run_replies(&self, mut replies: mpsc::Receiver<ReplyMessage>) {
        while let Some(message) = replies.recv().await {
            match message {
                ReplyMessage::Confirmation(response) => {
                    self.resolve(response).await;
                }
            }
        }

        self.replies_closed.store(true, Ordering::Release);
        let count = self.cancel_all().await;
        tracing::warn!(outstanding = count, "Reply channel closed");
    }

    /// Spawn [`run_replies`](Self::run_replies) on its own task
    pub fn spawn_reply_pump(self: &Arc<Self>, replies: mpsc::Receiver<ReplyMessage>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move { this.run_replies(replies).await })
    }

    /// Fault all outstanding requests, returning how many there were
    pub async fn cancel_all(&self) -> usize {
        let mut pending = self.pending.lock().await;
        let count = pending.len();
        // dropping the senders wakes every waiter with a closed channel
        pending.clear();
        if count > 0 {
            tracing::info!(count = count, "Cancelled pending confirmations");
        }
        count
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

fn new_confirmation_id() -> String {
    format!("cfm-{}", uuid::Uuid::new_v4())
}

/// Human-readable prompt for a confirmation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPrompt {
    pub app: String,
    pub perm: String,
    pub risk: String,
}

impl ConfirmationPrompt {
    pub fn render(&self) -> String {
        format!(
            "{} requests {}. Risk score: {}. Allow?",
            self.app, self.perm, self.risk
        )
    }
}

impl From<&ConfirmationRequest> for ConfirmationPrompt {
    fn from(request: &ConfirmationRequest) -> Self {
        Self {
            app: request.app_name.clone(),
            perm: request.capability.to_string(),
            risk: request.risk_summary.clone(),
        }
    }
}

/// The place a human answers confirmation prompts
#[async_trait]
pub trait ConfirmationSurface: Send + Sync {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Result<Decision>;
}

/// Surface that answers every prompt with the same decision
///
/// For headless deployments and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedSurface {
    decision: Decision,
}

impl FixedSurface {
    pub fn new(decision: Decision) -> Self {
        Self { decision }
    }
}

#[async_trait]
impl ConfirmationSurface for FixedSurface {
    async fn ask(&self, prompt: &ConfirmationPrompt) -> Result<Decision> {
        tracing::debug!(prompt = %prompt.render(), decision = ?self.decision, "Auto-answered confirmation");
        Ok(self.decision)
    }
}

/// Surface with no human attached; every prompt fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnattendedSurface;

#[async_trait]
impl ConfirmationSurface for UnattendedSurface {
    async fn ask(&self, _prompt: &ConfirmationPrompt) -> Result<Decision> {
        Err(WatchError::Timeout("no confirmation surface attached".to_string()))
    }
}

/// Answer a request on its own task and send the reply back
///
/// A failed prompt sends nothing; the origin's timeout then applies.
pub fn spawn_answer(
    surface: Arc<dyn ConfirmationSurface>,
    request: ConfirmationRequest,
    replies: Arc<dyn Relay<ReplyMessage>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let prompt = ConfirmationPrompt::from(&request);
        match surface.ask(&prompt).await {
            Ok(decision) => {
                send_or_log(
                    replies.as_ref(),
                    ReplyMessage::Confirmation(ConfirmationResponse {
                        id: request.id,
                        decision,
                    }),
                    "confirmation reply",
                );
            }
            Err(e) => tracing::warn!(
                confirmation_id = %request.id,
                error = %e,
                "Confirmation prompt failed, no reply sent"
            ),
        }
    })
}
