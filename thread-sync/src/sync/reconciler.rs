//! Remote batch reconciliation
//!
//! Turns a [`RemoteThreadBatch`] into the minimal set of local writes:
//! create threads the store has never seen, replace threads whose remote
//! content changed, delete threads the server reports as removed. The writes
//! and the watermark advance are committed as a single batch.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::view_model::ThreadListViewModel;
use crate::adapters::sqlite::{PendingOp, ThreadQuery, ThreadStore};
use crate::config::LocalField;
use crate::types::error::SyncError;
use crate::types::{RemoteThread, RemoteThreadBatch, ThreadItem};

/// A local thread and the row that replaces it
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadUpdate {
    pub current: ThreadItem,
    pub replacement: ThreadItem,
}

/// Disjoint create/update/delete sets for one batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub to_create: Vec<ThreadItem>,
    pub to_update: Vec<ThreadUpdate>,
    pub to_delete: Vec<ThreadItem>,
}

impl ReconcilePlan {
    pub fn into_ops(self) -> Vec<PendingOp> {
        let mut ops =
            Vec::with_capacity(self.to_create.len() + self.to_update.len() + self.to_delete.len());
        ops.extend(self.to_create.into_iter().map(PendingOp::prepare_create));
        ops.extend(self.to_update.into_iter().map(|u| {
            let replacement = u.replacement;
            PendingOp::prepare_update(&u.current, move |t| *t = replacement)
        }));
        ops.extend(self.to_delete.iter().map(PendingOp::prepare_destroy));
        ops
    }
}

/// Overwrite every remote-owned field of `local` from `remote`
fn replace_from_remote(local: &ThreadItem, remote: &RemoteThread, preserve: &[LocalField]) -> ThreadItem {
    let mut replacement = remote.to_item(&local.parent_id);
    if preserve.contains(&LocalField::DraftMessage) {
        replacement.draft_message = local.draft_message.clone();
    }
    replacement
}

/// Diff `batch` against `local`, the current threads of `parent_id`.
///
/// An id listed in both `updated` and `removed` is deleted. Repeated ids in
/// `updated` resolve to the last occurrence. Updates that would write the
/// row unchanged are left out.
pub fn plan(
    parent_id: &str,
    batch: &RemoteThreadBatch,
    local: &[ThreadItem],
    preserve: &[LocalField],
) -> ReconcilePlan {
    let local_by_id: HashMap<&str, &ThreadItem> =
        local.iter().map(|t| (t.id.as_str(), t)).collect();
    let removed: HashSet<&str> = batch.removed.iter().map(|r| r.id.as_str()).collect();

    let mut latest: HashMap<&str, &RemoteThread> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for remote in &batch.updated {
        if latest.insert(remote.id.as_str(), remote).is_none() {
            order.push(remote.id.as_str());
        }
    }

    let mut result = ReconcilePlan::default();

    for id in order {
        if removed.contains(id) {
            continue;
        }
        let remote = latest[id];
        match local_by_id.get(id) {
            Some(current) => {
                let replacement = replace_from_remote(current, remote, preserve);
                if replacement != **current {
                    result.to_update.push(ThreadUpdate {
                        current: (*current).clone(),
                        replacement,
                    });
                }
            }
            None => result.to_create.push(remote.to_item(parent_id)),
        }
    }

    let mut deleted: HashSet<&str> = HashSet::new();
    for r in &batch.removed {
        if let Some(current) = local_by_id.get(r.id.as_str()) {
            if deleted.insert(r.id.as_str()) {
                result.to_delete.push((*current).clone());
            }
        }
    }

    result
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Watermark written with the batch
    pub watermark: Option<DateTime<Utc>>,
}

impl ReconcileOutcome {
    pub fn mutations(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

pub enum ReconcileTarget {
    /// Write through the store; the subscription row carries the watermark
    Persisted {
        store: ThreadStore,
        subscription_id: String,
    },
    /// No persisted parent: keep threads in the view's memory only
    InMemory {
        parent_id: String,
        view: Arc<ThreadListViewModel>,
    },
}

pub struct Reconciler {
    target: ReconcileTarget,
    preserve_local_fields: Vec<LocalField>,
}

impl Reconciler {
    pub fn persisted(
        store: ThreadStore,
        subscription_id: impl Into<String>,
        preserve_local_fields: Vec<LocalField>,
    ) -> Self {
        Self {
            target: ReconcileTarget::Persisted {
                store,
                subscription_id: subscription_id.into(),
            },
            preserve_local_fields,
        }
    }

    pub fn in_memory(parent_id: impl Into<String>, view: Arc<ThreadListViewModel>) -> Self {
        Self {
            target: ReconcileTarget::InMemory {
                parent_id: parent_id.into(),
                view,
            },
            preserve_local_fields: Vec::new(),
        }
    }

    pub fn is_persisted(&self) -> bool {
        matches!(self.target, ReconcileTarget::Persisted { .. })
    }

    /// Reconcile one batch. On error nothing has been written.
    pub fn apply(&self, batch: RemoteThreadBatch) -> Result<ReconcileOutcome, SyncError> {
        match &self.target {
            ReconcileTarget::Persisted {
                store,
                subscription_id,
            } => {
                let local = store.query_threads(&ThreadQuery::for_parent(subscription_id.as_str()))?;
                let plan = plan(subscription_id, &batch, &local, &self.preserve_local_fields);
                let outcome = ReconcileOutcome {
                    created: plan.to_create.len(),
                    updated: plan.to_update.len(),
                    deleted: plan.to_delete.len(),
                    watermark: batch.as_of,
                };

                let mut ops = plan.into_ops();
                if let Some(as_of) = batch.as_of {
                    ops.push(PendingOp::prepare_watermark(subscription_id, Some(as_of)));
                }
                store.run_batch(ops)?;

                debug!(
                    "Reconciled {}: {} created, {} updated, {} deleted",
                    subscription_id, outcome.created, outcome.updated, outcome.deleted
                );
                Ok(outcome)
            }
            ReconcileTarget::InMemory { parent_id, view } => {
                let local = view.memory_items();
                let plan = plan(parent_id, &batch, &local, &self.preserve_local_fields);
                let created = plan.to_create.len();
                view.append_items(plan.to_create);

                debug!("Appended {} threads in memory for {}", created, parent_id);
                Ok(ReconcileOutcome {
                    created,
                    ..ReconcileOutcome::default()
                })
            }
        }
    }
}
