use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use folio_model::PatronId;
use tracing::{info, warn};

use crate::error::Result;

/// What happened, from the patron's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RequestApproved,
    RequestRejected,
    CopyAvailable,
    BorrowOverdue,
    PenaltyAssessed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestApproved => "request_approved",
            EventKind::RequestRejected => "request_rejected",
            EventKind::CopyAvailable => "copy_available",
            EventKind::BorrowOverdue => "borrow_overdue",
            EventKind::PenaltyAssessed => "penalty_assessed",
        }
    }
}

/// Best-effort delivery of patron-facing events.
///
/// Implementations must not assume their failures roll anything back;
/// every call site treats delivery as fire-and-forget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        patron_id: PatronId,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Result<()>;
}

/// Sink that records events to the log stream only.
#[derive(Debug, Default, Clone)]
pub struct LogNotificationSink;

#[async_trait]
impl NotificationSink for LogNotificationSink {
    async fn notify(
        &self,
        patron_id: PatronId,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Result<()> {
        info!(%patron_id, event = kind.as_str(), %payload, "notification");
        Ok(())
    }
}

/// Sink that keeps every delivered event in memory, for tests and
/// embedders that collect events in-process.
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    events: Mutex<Vec<(PatronId, EventKind, serde_json::Value)>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    // A recorder panicking mid-push poisons the mutex; the event list
    // itself stays valid, so recovery keeps the sink usable.
    fn events(
        &self,
    ) -> MutexGuard<'_, Vec<(PatronId, EventKind, serde_json::Value)>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drains and returns everything delivered so far, oldest first.
    pub fn take(&self) -> Vec<(PatronId, EventKind, serde_json::Value)> {
        std::mem::take(&mut *self.events())
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(
        &self,
        patron_id: PatronId,
        kind: EventKind,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.events().push((patron_id, kind, payload));
        Ok(())
    }
}

/// Dispatches a notification without blocking the caller.
///
/// Delivery failures are logged and swallowed; a committed state
/// transition is never reversed because a notification could not go
/// out.
pub fn dispatch(
    sink: Arc<dyn NotificationSink>,
    patron_id: PatronId,
    kind: EventKind,
    payload: serde_json::Value,
) {
    tokio::spawn(async move {
        if let Err(err) = sink.notify(patron_id, kind, payload).await {
            warn!(
                %patron_id,
                event = kind.as_str(),
                error = %err,
                "notification dispatch failed"
            );
        }
    });
}
