//! Progress events for front ends.
//!
//! Delivery is best-effort: live events go over a bounded broadcast channel
//! and a slow subscriber may miss some, but the latest event (in particular
//! the terminal one) is always available from [`ProgressSink::latest`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Researching,
    Compressing,
    Reporting,
    Complete,
    Cancelled,
    Error,
}

impl Phase {
    /// Whether no further events follow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Planning => "planning",
            Phase::Researching => "researching",
            Phase::Compressing => "compressing",
            Phase::Reporting => "reporting",
            Phase::Complete => "complete",
            Phase::Cancelled => "cancelled",
            Phase::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub percent: u8,
    pub urls_found: usize,
}

impl ProgressEvent {
    pub fn new(phase: Phase, message: impl Into<String>, percent: u8, urls_found: usize) -> Self {
        Self {
            phase,
            message: message.into(),
            percent: percent.min(100),
            urls_found,
        }
    }
}

struct Channels {
    live: broadcast::Sender<ProgressEvent>,
    latest: watch::Sender<Option<ProgressEvent>>,
}

/// Cloneable handle for emitting progress.
#[derive(Clone)]
pub struct ProgressSink {
    channels: Arc<Channels>,
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (latest, _) = watch::channel(None);
        Self {
            channels: Arc::new(Channels { live, latest }),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        tracing::debug!(
            phase = event.phase.as_str(),
            percent = event.percent,
            urls = event.urls_found,
            "{}",
            event.message
        );
        self.channels.latest.send_replace(Some(event.clone()));
        // no subscribers is fine
        let _ = self.channels.live.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.channels.live.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<Option<ProgressEvent>> {
        self.channels.latest.subscribe()
    }

    pub fn latest(&self) -> Option<ProgressEvent> {
        self.channels.latest.borrow().clone()
    }
}
