//! Change observers for the thread store
//!
//! Every `observe_*` call registers a flume sender here and hands back a
//! [`StoreSubscription`]. After a batch commits, the store asks the registry
//! which observers are affected and pushes fresh values to them. Dropping or
//! unsubscribing the handle removes the observer.

use flume::Sender;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::debug;

use crate::types::{ParentSubscription, ThreadItem};

/// Live query over the threads of one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadQuery {
    pub parent_id: String,
}

impl ThreadQuery {
    pub fn for_parent(parent_id: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
        }
    }
}

/// Records touched by one committed batch
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub subscriptions: BTreeSet<String>,
    pub thread_parents: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty() && self.thread_parents.is_empty()
    }
}

pub(crate) type RecordTarget = (u64, String, Sender<ParentSubscription>);
pub(crate) type QueryTarget = (u64, ThreadQuery, Sender<Vec<ThreadItem>>);

#[derive(Default)]
struct Observers {
    records: HashMap<u64, (String, Sender<ParentSubscription>)>,
    queries: HashMap<u64, (ThreadQuery, Sender<Vec<ThreadItem>>)>,
}

#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Observers>,
}

impl ObserverRegistry {
    fn lock(&self) -> MutexGuard<'_, Observers> {
        self.observers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn add_record(
        self: &Arc<Self>,
        subscription_id: &str,
        tx: Sender<ParentSubscription>,
    ) -> StoreSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .records
            .insert(id, (subscription_id.to_string(), tx));
        StoreSubscription::new(id, self)
    }

    pub(crate) fn add_query(
        self: &Arc<Self>,
        query: ThreadQuery,
        tx: Sender<Vec<ThreadItem>>,
    ) -> StoreSubscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().queries.insert(id, (query, tx));
        StoreSubscription::new(id, self)
    }

    pub(crate) fn remove(&self, id: u64) {
        let mut observers = self.lock();
        observers.records.remove(&id);
        observers.queries.remove(&id);
    }

    /// Observers affected by `changes`, cloned out so no lock is held while notifying
    pub(crate) fn targets(&self, changes: &ChangeSet) -> (Vec<RecordTarget>, Vec<QueryTarget>) {
        let observers = self.lock();
        let records = observers
            .records
            .iter()
            .filter(|(_, (sub_id, _))| changes.subscriptions.contains(sub_id))
            .map(|(id, (sub_id, tx))| (*id, sub_id.clone(), tx.clone()))
            .collect();
        let queries = observers
            .queries
            .iter()
            .filter(|(_, (query, _))| changes.thread_parents.contains(&query.parent_id))
            .map(|(id, (query, tx))| (*id, query.clone(), tx.clone()))
            .collect();
        (records, queries)
    }

    pub(crate) fn len(&self) -> usize {
        let observers = self.lock();
        observers.records.len() + observers.queries.len()
    }
}

/// Cancellation handle for one observed stream
pub struct StoreSubscription {
    id: u64,
    registry: Weak<ObserverRegistry>,
}

impl StoreSubscription {
    fn new(id: u64, registry: &Arc<ObserverRegistry>) -> Self {
        Self {
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Stop receiving updates; equivalent to dropping the handle
    pub fn unsubscribe(self) {}
}

impl Drop for StoreSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            debug!("Removing store observer {}", self.id);
            registry.remove(self.id);
        }
    }
}
