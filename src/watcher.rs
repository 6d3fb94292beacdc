//! Runtime wiring
//!
//! [`PermissionWatcher::start`] spawns the decision context and hands back
//! the capture-side handles: interceptors bound to a page origin, the
//! confirmation manager, a read-only activity view, and the control relay.
//!
//! ```text
//! interceptor ──page relay──▶ DecisionContext ──▶ classifier ──▶ engine ──▶ store
//!      ▲                            │
//!      └─────reply relay────────────┘  (confirmation replies)
//! ```

use crate::classifier::{ClassifierClient, HttpScoringService, ScoringService};
use crate::config::WatchConfig;
use crate::confirmation::{spawn_answer, ConfirmationManager, ConfirmationSurface};
use crate::engine::DecisionEngine;
use crate::error::{Result, WatchError};
use crate::interceptor::CapabilityInterceptor;
use crate::notify::Notifier;
use crate::relay::{send_or_log, ChannelRelay, ControlMessage, PageMessage, Relay, ReplyMessage};
use crate::state::{FileStateStore, MemoryStateStore, StateStore};
use crate::store::ActivityView;
use crate::types::PageOrigin;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// The single task that owns the decision engine
///
/// Page and control messages are each processed in arrival order; there is
/// no ordering between the two channels.
///
/// Scoring runs inline, one event at a time, bounded by the scoring timeout.
/// While a call is in flight further page events queue in the relay buffer;
/// once it is full the sender drops them with a degraded notification.
pub struct DecisionContext {
    engine: DecisionEngine,
    pages: mpsc::Receiver<PageMessage>,
    controls: mpsc::Receiver<ControlMessage>,
    surface: Arc<dyn ConfirmationSurface>,
    replies: Arc<dyn Relay<ReplyMessage>>,
    shutdown: oneshot::Receiver<()>,
}

impl DecisionContext {
    /// Process messages until shutdown or until every page relay is gone
    ///
    /// Queued messages are handled before a shutdown request. State is
    /// flushed on exit and the engine is handed back.
    pub async fn run(mut self) -> DecisionEngine {
        let mut controls_open = true;

        loop {
            tokio::select! {
                biased;

                message = self.controls.recv(), if controls_open => match message {
                    Some(message) => self.handle_control(message),
                    None => {
                        tracing::debug!("Control relay closed");
                        controls_open = false;
                    }
                },
                message = self.pages.recv() => match message {
                    Some(message) => self.handle_page(message).await,
                    None => {
                        tracing::info!("All page relays closed, decision context stopping");
                        break;
                    }
                },
                _ = &mut self.shutdown => {
                    tracing::info!("Decision context shutting down");
                    break;
                }
            }
        }

        self.engine.flush();
        self.engine
    }

    async fn handle_page(&mut self, message: PageMessage) {
        match message {
            PageMessage::Permission(event) => {
                self.engine.handle_event(event).await;
            }
            PageMessage::Confirm(request) => {
                tracing::debug!(
                    confirmation_id = %request.id,
                    app = %request.app_name,
                    capability = %request.capability,
                    "Confirmation requested"
                );
                spawn_answer(self.surface.clone(), request, self.replies.clone());
            }
        }
    }

    fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::SetMonitoring(enabled) => self.engine.set_monitoring(enabled),
            ControlMessage::Flush => {
                self.engine.flush();
            }
        }
    }
}

/// Handles to a running monitor
pub struct PermissionWatcher {
    pages: Arc<dyn Relay<PageMessage>>,
    controls: Arc<dyn Relay<ControlMessage>>,
    confirmations: Arc<ConfirmationManager>,
    view: ActivityView,
    notifier: Arc<dyn Notifier>,
    shutdown: Option<oneshot::Sender<()>>,
    context: JoinHandle<DecisionEngine>,
    reply_pump: JoinHandle<()>,
}

impl PermissionWatcher {
    /// Start from configuration alone
    ///
    /// Scoring goes over HTTP to `config.scoring.base_url`; state lives in
    /// `config.store.state_path` when set, in memory otherwise.
    pub fn from_config(
        config: &WatchConfig,
        notifier: Arc<dyn Notifier>,
        surface: Arc<dyn ConfirmationSurface>,
    ) -> Result<Self> {
        let service = Arc::new(HttpScoringService::new(&config.scoring)?);
        let state_store: Arc<dyn StateStore> = match &config.store.state_path {
            Some(path) => Arc::new(FileStateStore::new(path)),
            None => Arc::new(MemoryStateStore::default()),
        };
        Self::start(config, service, notifier, surface, state_store)
    }

    /// Start the decision context with the given collaborators
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &WatchConfig,
        service: Arc<dyn ScoringService>,
        notifier: Arc<dyn Notifier>,
        surface: Arc<dyn ConfirmationSurface>,
        state_store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        config.validate()?;

        let (pages, page_rx) = relay::<PageMessage>("page", config);
        let (controls, control_rx) = relay::<ControlMessage>("control", config);
        let (replies, reply_rx) = relay::<ReplyMessage>("reply", config);

        let classifier = ClassifierClient::new(service);
        let scorer = classifier.clone();
        tokio::spawn(async move {
            scorer.health_check().await;
        });

        let engine = DecisionEngine::new(
            config.store.capacity,
            classifier,
            notifier.clone(),
            state_store,
            config.monitoring_enabled,
        );
        let view = engine.view();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let context = DecisionContext {
            engine,
            pages: page_rx,
            controls: control_rx,
            surface,
            replies: Arc::new(replies),
            shutdown: shutdown_rx,
        };
        let context = tokio::spawn(context.run());

        let pages: Arc<dyn Relay<PageMessage>> = Arc::new(pages);
        let confirmations = Arc::new(ConfirmationManager::from_config(
            pages.clone(),
            &config.confirmation,
        ));
        let reply_pump = confirmations.spawn_reply_pump(reply_rx);

        tracing::info!(
            scoring = %config.scoring.base_url,
            capacity = config.store.capacity,
            monitoring = config.monitoring_enabled,
            "Permission watcher started"
        );

        Ok(Self {
            pages,
            controls: Arc::new(controls),
            confirmations,
            view,
            notifier,
            shutdown: Some(shutdown_tx),
            context,
            reply_pump,
        })
    }

    /// Interceptor for code running at `origin`
    pub fn interceptor(&self, origin: PageOrigin) -> CapabilityInterceptor {
        CapabilityInterceptor::new(self.pages.clone(), origin)
            .with_degraded_notifier(self.notifier.clone())
    }

    /// Interceptor for code running at a page URL
    pub fn interceptor_for_url(&self, url: &str) -> Result<CapabilityInterceptor> {
        Ok(self.interceptor(PageOrigin::from_url(url)?))
    }

    pub fn confirmations(&self) -> Arc<ConfirmationManager> {
        self.confirmations.clone()
    }

    pub fn view(&self) -> ActivityView {
        self.view.clone()
    }

    pub fn control(&self) -> Arc<dyn Relay<ControlMessage>> {
        self.controls.clone()
    }

    /// Ask the decision context to turn monitoring on or off
    pub fn set_monitoring(&self, enabled: bool) -> bool {
        send_or_log(
            self.controls.as_ref(),
            ControlMessage::SetMonitoring(enabled),
            "set monitoring",
        )
    }

    /// Ask the decision context to persist its state now
    pub fn flush(&self) -> bool {
        send_or_log(self.controls.as_ref(), ControlMessage::Flush, "flush")
    }

    /// Stop the decision context and return its engine
    ///
    /// Dropping the watcher stops the context too, without waiting.
    pub async fn shutdown(mut self) -> Result<DecisionEngine> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.reply_pump.abort();
        self.confirmations.cancel_all().await;

        self.context
            .await
            .map_err(|e| WatchError::Relay(format!("Decision context ended abnormally: {}", e)))
    }
}

fn relay<M>(name: &str, config: &WatchConfig) -> (ChannelRelay<M>, mpsc::Receiver<M>)
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    let (relay, rx) = ChannelRelay::channel(name, config.relay.buffer);
    if config.relay.serialized {
        (relay.serialized(), rx)
    } else {
        (relay, rx)
    }
}
