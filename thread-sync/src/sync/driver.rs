//! Full-load vs delta-sync decision and the delta path
//!
//! A parent with no stored watermark is loaded page by page; one with a
//! watermark is brought up to date with a single delta fetch. A parent the
//! store does not know runs in degraded mode for the whole session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use super::events::SessionEvent;
use super::reconciler::{ReconcileOutcome, Reconciler};
use super::view_model::ThreadListViewModel;
use crate::adapters::remote::ThreadsApi;
use crate::types::error::SyncError;
use crate::types::{ParentSubscription, RemoteThreadBatch};
use crate::utils::now_utc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum SyncMode {
    /// No persisted parent; threads live in memory only
    Degraded,
    /// No watermark yet; paginate and record `watermark` afterwards
    FullLoad { watermark: DateTime<Utc> },
    /// Fetch changes after `since`
    Delta { since: DateTime<Utc> },
}

/// Pick the sync mode for a parent given its stored record, if any
pub fn decide(subscription: Option<&ParentSubscription>, now: DateTime<Utc>) -> SyncMode {
    match subscription {
        None => SyncMode::Degraded,
        Some(sub) => match sub.last_sync_watermark {
            None => SyncMode::FullLoad { watermark: now },
            Some(since) => SyncMode::Delta { since },
        },
    }
}

/// Source of the delta watermark
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct SyncDriver {
    parent_id: String,
    api: Arc<dyn ThreadsApi>,
    reconciler: Reconciler,
    view: Arc<ThreadListViewModel>,
    events: flume::Sender<SessionEvent>,
    clock: Clock,
}

impl SyncDriver {
    pub fn new(
        parent_id: impl Into<String>,
        api: Arc<dyn ThreadsApi>,
        reconciler: Reconciler,
        view: Arc<ThreadListViewModel>,
        events: flume::Sender<SessionEvent>,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            api,
            reconciler,
            view,
            events,
            clock: Arc::new(now_utc),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Fetch changes since `since` and reconcile them.
    ///
    /// Errors are logged and reported as a `SyncFailed` event; the stored
    /// watermark only moves when the reconcile batch commits.
    pub async fn delta_sync(&self, since: DateTime<Utc>) {
        if !self.view.is_attached() {
            return;
        }

        self.view.set_loading(true);
        match self.run_delta(since).await {
            Ok(Some(outcome)) => {
                info!(
                    "Delta sync of {}: {} created, {} updated, {} deleted",
                    self.parent_id, outcome.created, outcome.updated, outcome.deleted
                );
                let _ = self.events.send(SessionEvent::DeltaApplied {
                    parent_id: self.parent_id.clone(),
                    created: outcome.created,
                    updated: outcome.updated,
                    deleted: outcome.deleted,
                });
            }
            Ok(None) => {}
            Err(e) => {
                error!("Delta sync of {} failed: {}", self.parent_id, e);
                let _ = self.events.send(SessionEvent::SyncFailed {
                    parent_id: self.parent_id.clone(),
                    message: e.to_string(),
                });
            }
        }
        self.view.set_loading(false);
    }

    /// `Ok(None)` when the view detached while the fetch was in flight
    async fn run_delta(&self, since: DateTime<Utc>) -> Result<Option<ReconcileOutcome>, SyncError> {
        let as_of = (self.clock)();
        let delta = self.api.fetch_delta(&self.parent_id, since).await?;

        if !self.view.is_attached() {
            info!("Discarding delta for {} fetched after detach", self.parent_id);
            return Ok(None);
        }

        let batch = RemoteThreadBatch::delta(delta.updated, delta.removed, as_of);
        self.reconciler.apply(batch).map(Some)
    }
}
