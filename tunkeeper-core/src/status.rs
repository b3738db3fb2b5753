//! Lifecycle status events and the sinks that consume them

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::params::ConnectionId;

/// Lifecycle status surfaced to the UI and the foreground indicator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Connecting,
    Connected,
    Disconnected,
}

impl LifecycleStatus {
    /// Human-readable text for this transition
    pub fn message(&self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status event emitted by the connection manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdate {
    /// Attempt this event belongs to, when there is one
    pub connection_id: Option<ConnectionId>,
    pub status: LifecycleStatus,
    /// Optional reason, e.g. why a disconnect happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(status: LifecycleStatus, connection_id: Option<ConnectionId>) -> Self {
        Self {
            connection_id,
            status,
            reason: None,
            at: Utc::now(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// The line shown to users: the status text, plus the reason if any.
    pub fn display_text(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{}: {}", self.status.message(), reason),
            None => self.status.message().to_string(),
        }
    }
}

/// Consumer of lifecycle status events.
///
/// The manager calls sinks with no lock held and does not wait for a
/// response, so implementations may call back into `start`/`stop`. They must
/// return quickly.
pub trait StatusSink: Send + Sync {
    /// Deliver one status event
    fn on_status(&self, update: &StatusUpdate);

    /// Drop any foreground indicator held on behalf of the session
    fn release(&self) {}
}

/// Broadcasts status events to any number of subscribers
pub struct BroadcastSink {
    tx: broadcast::Sender<StatusUpdate>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(100)
    }
}

impl StatusSink for BroadcastSink {
    fn on_status(&self, update: &StatusUpdate) {
        // No subscribers is fine
        let _ = self.tx.send(update.clone());
    }
}

/// Keeps every event it receives; used by tests and diagnostics
#[derive(Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<StatusUpdate>>,
    releases: Mutex<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn statuses(&self) -> Vec<LifecycleStatus> {
        self.updates().into_iter().map(|u| u.status).collect()
    }

    /// Number of events with the given status
    pub fn count(&self, status: LifecycleStatus) -> usize {
        self.updates().iter().filter(|u| u.status == status).count()
    }

    pub fn last(&self) -> Option<StatusUpdate> {
        self.updates().last().cloned()
    }

    pub fn release_count(&self) -> usize {
        *self.releases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StatusSink for RecordingSink {
    fn on_status(&self, update: &StatusUpdate) {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(update.clone());
    }

    fn release(&self) {
        *self.releases.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

/// Forwards every event to several sinks in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn StatusSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn StatusSink>>) -> Self {
        Self { sinks }
    }
}

impl StatusSink for FanoutSink {
    fn on_status(&self, update: &StatusUpdate) {
        for sink in &self.sinks {
            sink.on_status(update);
        }
    }

    fn release(&self) {
        for sink in &self.sinks {
            sink.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_messages() {
        assert_eq!(LifecycleStatus::Connecting.message(), "Connecting...");
        assert_eq!(LifecycleStatus::Connected.message(), "Connected");
        assert_eq!(LifecycleStatus::Disconnected.message(), "Disconnected");
    }

    #[test]
    fn display_text_includes_reason() {
        let update = StatusUpdate::new(LifecycleStatus::Disconnected, Some(3))
            .with_reason("Handshake failed: timeout");
        assert_eq!(
            update.display_text(),
            "Disconnected: Handshake failed: timeout"
        );

        let plain = StatusUpdate::new(LifecycleStatus::Connected, Some(3));
        assert_eq!(plain.display_text(), "Connected");
    }

    #[test]
    fn status_update_serializes_snake_case() {
        let update = StatusUpdate::new(LifecycleStatus::Connecting, Some(1));
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"status\":\"connecting\""));
        assert!(!json.contains("reason"));
    }

    #[tokio::test]
    async fn broadcast_sink_fans_out_to_subscribers() {
        let sink = BroadcastSink::new(8);
        let mut rx1 = sink.subscribe();
        let mut rx2 = sink.subscribe();

        sink.on_status(&StatusUpdate::new(LifecycleStatus::Connected, Some(7)));

        assert_eq!(rx1.recv().await.unwrap().connection_id, Some(7));
        assert_eq!(rx2.recv().await.unwrap().status, LifecycleStatus::Connected);
    }

    #[test]
    fn broadcast_sink_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::default();
        sink.on_status(&StatusUpdate::new(LifecycleStatus::Disconnected, None));
    }

    #[test]
    fn fanout_forwards_updates_and_releases() {
        let a = Arc::new(RecordingSink::new());
        let b = Arc::new(RecordingSink::new());
        let fanout = FanoutSink::new(vec![a.clone(), b.clone()]);

        fanout.on_status(&StatusUpdate::new(LifecycleStatus::Connecting, Some(1)));
        fanout.release();

        assert_eq!(a.statuses(), vec![LifecycleStatus::Connecting]);
        assert_eq!(b.count(LifecycleStatus::Connecting), 1);
        assert_eq!(a.release_count(), 1);
        assert_eq!(b.release_count(), 1);
    }
}
