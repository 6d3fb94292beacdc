//! Capability interceptor
//!
//! Runs inside the monitored context and decorates capability calls. The
//! decorated call resolves exactly as the undecorated one would; the only
//! side effect is a pair of permission events sent over the page relay:
//! `pending` before the call is polled, then one terminal `granted` or
//! `denied` event once it resolves.
//!
//! Push-style status sources are watched separately and produce `changed`
//! events with no `pending` precursor.

use crate::notify::{Notification, Notifier};
use crate::relay::{send_or_log, PageMessage, Relay};
use crate::types::{Capability, PageOrigin, PermissionEvent, PermissionState, PermissionStatus};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Transparent decorator for capability APIs
#[derive(Clone)]
pub struct CapabilityInterceptor {
    relay: Arc<dyn Relay<PageMessage>>,
    origin: PageOrigin,
    /// Shown directly from the capture context when the relay is down
    degraded: Option<Arc<dyn Notifier>>,
}

impl CapabilityInterceptor {
    pub fn new(relay: Arc<dyn Relay<PageMessage>>, origin: PageOrigin) -> Self {
        Self {
            relay,
            origin,
            degraded: None,
        }
    }

    /// Show a degraded notification whenever a request cannot be relayed
    pub fn with_degraded_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.degraded = Some(notifier);
        self
    }

    pub fn origin(&self) -> &PageOrigin {
        &self.origin
    }

    /// Decorate a fallible capability call
    ///
    /// `Ok` is reported as `granted`, `Err` as `denied`. The result is
    /// returned untouched.
    pub async fn intercept<T, E, Fut>(
        &self,
        capability: Capability,
        call: Fut,
    ) -> std::result::Result<T, E>
    where
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.intercept_with(capability, call, |outcome| outcome.is_ok())
            .await
    }

    /// Decorate a capability call whose grant state is read from its output
    ///
    /// Used for APIs that resolve successfully with a refusal, such as a
    /// notification permission request answering `"denied"`.
    pub async fn intercept_with<R, Fut, F>(&self, capability: Capability, call: Fut, granted: F) -> R
    where
        Fut: Future<Output = R>,
        F: FnOnce(&R) -> bool,
    {
        let pending = PermissionEvent::pending(capability, &self.origin);
        self.emit(pending.clone());

        let outcome = call.await;

        match pending.resolve(granted(&outcome)) {
            Ok(terminal) => self.emit(terminal),
            Err(e) => tracing::warn!(
                request_id = %pending.request_id,
                error = %e,
                "Could not derive terminal permission event"
            ),
        }

        outcome
    }

    /// Watch a push-style status source for a capability
    ///
    /// The first status is the initial state and emits nothing. Every later
    /// status that differs from the previous one emits one `changed` event.
    /// The task ends when the stream ends.
    pub fn watch_status<S>(&self, capability: Capability, statuses: S) -> JoinHandle<()>
    where
        S: Stream<Item = PermissionStatus> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let mut statuses = Box::pin(statuses);

            let mut last = match statuses.next().await {
                Some(initial) => initial,
                None => return,
            };
            tracing::debug!(capability = %capability, status = ?last, "Initial permission status");

            while let Some(status) = statuses.next().await {
                if status == last {
                    continue;
                }
                last = status;
                this.emit(PermissionEvent::changed(capability.clone(), &this.origin, status));
            }
        })
    }

    fn emit(&self, event: PermissionEvent) {
        tracing::debug!(
            request_id = %event.request_id,
            capability = %event.capability,
            state = %event.state,
            host = %event.origin_host,
            "Permission event"
        );

        // The start of a logical call gets the degraded notice; its terminal
        // event would only repeat it.
        let opens_call = !matches!(event.state, PermissionState::Granted | PermissionState::Denied);
        let capability = event.capability.clone();

        let delivered = send_or_log(
            self.relay.as_ref(),
            PageMessage::Permission(event),
            "permission event",
        );

        if !delivered && opens_call {
            if let Some(notifier) = &self.degraded {
                notifier.notify(Notification::degraded(capability.as_str()));
            }
        }
    }
}
