//! Context relay: best-effort transport across context boundaries
//!
//! Each boundary has its own closed message type. Only owned, serializable
//! values cross; delivery is at-most-once and a failed send never raises
//! past [`send_or_log`].

use crate::error::{Result, WatchError};
use crate::types::{ConfirmationRequest, ConfirmationResponse, PermissionEvent};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Messages from the capture context to the decision context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PageMessage {
    /// An observed permission event
    Permission(PermissionEvent),
    /// A request for a human decision
    Confirm(ConfirmationRequest),
}

/// Messages from the decision context back to the capture context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ReplyMessage {
    Confirmation(ConfirmationResponse),
}

/// Messages from the host (dashboard, settings) to the decision context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Turn monitoring on or off (persisted)
    SetMonitoring(bool),
    /// Write current state to the state store now
    Flush,
}

/// One-way sender across a context boundary
///
/// `send` never blocks: a destination that is gone or saturated is a
/// `WatchError::Relay`.
pub trait Relay<M>: Send + Sync {
    fn send(&self, message: M) -> Result<()>;

    /// Relay name, used in logs
    fn name(&self) -> &str;
}

/// Relay over a bounded tokio mpsc channel
pub struct ChannelRelay<M> {
    tx: mpsc::Sender<M>,
    name: String,
    serialized: bool,
}

impl<M> Clone for ChannelRelay<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name.clone(),
            serialized: self.serialized,
        }
    }
}

impl<M> ChannelRelay<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    /// Create a relay and the receiving end of its channel
    pub fn channel(name: impl Into<String>, buffer: usize) -> (Self, mpsc::Receiver<M>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                name: name.into(),
                serialized: false,
            },
            rx,
        )
    }

    /// Pass every message through JSON before delivery
    ///
    /// The receiver then only ever sees a freshly decoded copy.
    pub fn serialized(mut self) -> Self {
        self.serialized = true;
        self
    }

    /// Whether the receiving context is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<M> Relay<M> for ChannelRelay<M>
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    fn send(&self, message: M) -> Result<()> {
        let message = if self.serialized {
            roundtrip(&message)?
        } else {
            message
        };

        self.tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => {
                WatchError::Relay(format!("Relay '{}' is full", self.name))
            }
            TrySendError::Closed(_) => {
                WatchError::Relay(format!("Relay '{}' destination is closed", self.name))
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn roundtrip<M: Serialize + DeserializeOwned>(message: &M) -> Result<M> {
    let bytes = serde_json::to_vec(message)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Send, log on failure, never raise
///
/// Returns whether the message was handed to the destination.
pub fn send_or_log<M>(relay: &dyn Relay<M>, message: M, what: &str) -> bool {
    match relay.send(message) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                relay = %relay.name(),
                message = what,
                error = %e,
                "Relay send failed, message dropped"
            );
            false
        }
    }
}
