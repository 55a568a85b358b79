//! SQLite-backed thread store
//!
//! The store is a cache of server state: every row can be rebuilt from the
//! remote API. Writes happen only through [`ThreadStore::run_batch`], which
//! applies a list of prepared operations in one transaction and then
//! re-emits affected records to their observers.

use chrono::{DateTime, Utc};
use flume::Receiver;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::observe::{ChangeSet, ObserverRegistry, StoreSubscription, ThreadQuery};
use super::pool::{create_memory_pool, create_pool, DbConnection, DbPool};
use super::{schema, subscriptions, threads};
use crate::config::StoreConfig;
use crate::types::error::SyncError;
use crate::types::{ParentSubscription, ThreadItem};

/// A write prepared outside the store and committed by [`ThreadStore::run_batch`]
#[derive(Debug, Clone, PartialEq)]
pub enum PendingOp {
    CreateThread(ThreadItem),
    UpdateThread(ThreadItem),
    DestroyThread { id: String, parent_id: String },
    UpsertSubscription(ParentSubscription),
    SetWatermark {
        subscription_id: String,
        watermark: Option<DateTime<Utc>>,
    },
}

impl PendingOp {
    pub fn prepare_create(thread: ThreadItem) -> Self {
        PendingOp::CreateThread(thread)
    }

    /// Copy `thread`, let `mutator` change the copy, and stage it as a full replace
    pub fn prepare_update<F>(thread: &ThreadItem, mutator: F) -> Self
    where
        F: FnOnce(&mut ThreadItem),
    {
        let mut updated = thread.clone();
        mutator(&mut updated);
        updated.id = thread.id.clone();
        PendingOp::UpdateThread(updated)
    }

    pub fn prepare_destroy(thread: &ThreadItem) -> Self {
        PendingOp::DestroyThread {
            id: thread.id.clone(),
            parent_id: thread.parent_id.clone(),
        }
    }

    pub fn prepare_watermark(subscription_id: &str, watermark: Option<DateTime<Utc>>) -> Self {
        PendingOp::SetWatermark {
            subscription_id: subscription_id.to_string(),
            watermark,
        }
    }

    fn apply(&self, conn: &rusqlite::Connection) -> Result<(), SyncError> {
        match self {
            PendingOp::CreateThread(thread) => threads::insert(conn, thread),
            PendingOp::UpdateThread(thread) => threads::update(conn, thread),
            PendingOp::DestroyThread { id, .. } => threads::delete(conn, id),
            PendingOp::UpsertSubscription(sub) => subscriptions::upsert(conn, sub),
            PendingOp::SetWatermark {
                subscription_id,
                watermark,
            } => subscriptions::set_watermark(conn, subscription_id, *watermark),
        }
    }

    fn record(&self, changes: &mut ChangeSet) {
        match self {
            PendingOp::CreateThread(thread) | PendingOp::UpdateThread(thread) => {
                changes.thread_parents.insert(thread.parent_id.clone());
            }
            PendingOp::DestroyThread { parent_id, .. } => {
                changes.thread_parents.insert(parent_id.clone());
            }
            PendingOp::UpsertSubscription(sub) => {
                changes.subscriptions.insert(sub.id.clone());
            }
            PendingOp::SetWatermark {
                subscription_id, ..
            } => {
                changes.subscriptions.insert(subscription_id.clone());
            }
        }
    }
}

/// Local persistent snapshot of subscriptions and their threads
#[derive(Clone)]
pub struct ThreadStore {
    pool: DbPool,
    observers: Arc<ObserverRegistry>,
    committed_batches: Arc<AtomicU64>,
    /// Held from commit through notify so observers see batches in commit order
    write_lock: Arc<Mutex<()>>,
}

impl ThreadStore {
    /// Open (or create) a store at the given path
    pub fn open<P: AsRef<Path>>(path: P, pool_size: u32) -> Result<Self, SyncError> {
        let pool = create_pool(path.as_ref(), pool_size)?;
        info!("Opened thread store at {:?}", path.as_ref());
        Self::with_pool(pool)
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, SyncError> {
        Self::open(&config.db_path, config.pool_size)
    }

    /// Create an in-memory store (for testing and ephemeral sessions)
    pub fn in_memory() -> Result<Self, SyncError> {
        Self::with_pool(create_memory_pool()?)
    }

    fn with_pool(pool: DbPool) -> Result<Self, SyncError> {
        let store = Self {
            pool,
            observers: Arc::new(ObserverRegistry::default()),
            committed_batches: Arc::new(AtomicU64::new(0)),
            write_lock: Arc::new(Mutex::new(())),
        };
        let conn = store.connection()?;
        schema::initialize_schema(&conn)?;
        drop(conn);
        Ok(store)
    }

    /// Get a connection from the pool
    pub fn connection(&self) -> Result<DbConnection, SyncError> {
        self.pool.get().map_err(|e| {
            SyncError::Database(format!("Failed to get database connection: {}", e))
        })
    }

    // ========== Reads ==========

    /// Point lookup; a miss is `SyncError::NotFound`
    pub fn find_subscription(&self, id: &str) -> Result<ParentSubscription, SyncError> {
        let conn = self.connection()?;
        subscriptions::get(&conn, id)?
            .ok_or_else(|| SyncError::NotFound(format!("subscription {}", id)))
    }

    pub fn find_thread(&self, id: &str) -> Result<ThreadItem, SyncError> {
        let conn = self.connection()?;
        threads::get(&conn, id)?.ok_or_else(|| SyncError::NotFound(format!("thread {}", id)))
    }

    pub fn query_threads(&self, query: &ThreadQuery) -> Result<Vec<ThreadItem>, SyncError> {
        let conn = self.connection()?;
        threads::list_for_subscription(&conn, &query.parent_id)
    }

    pub fn count_threads(&self, parent_id: &str) -> Result<usize, SyncError> {
        let conn = self.connection()?;
        threads::count_for_subscription(&conn, parent_id)
    }

    // ========== Observation ==========

    /// Observe one subscription record. The current value is delivered first.
    pub fn observe_subscription(
        &self,
        id: &str,
    ) -> Result<(Receiver<ParentSubscription>, StoreSubscription), SyncError> {
        let current = self.find_subscription(id)?;
        let (tx, rx) = flume::unbounded();
        let _ = tx.send(current);
        let handle = self.observers.add_record(id, tx);
        Ok((rx, handle))
    }

    /// Observe a live thread query. The current result is delivered first.
    pub fn observe_threads(
        &self,
        query: ThreadQuery,
    ) -> Result<(Receiver<Vec<ThreadItem>>, StoreSubscription), SyncError> {
        let current = self.query_threads(&query)?;
        let (tx, rx) = flume::unbounded();
        let _ = tx.send(current);
        let handle = self.observers.add_query(query, tx);
        Ok((rx, handle))
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    // ========== Writes ==========

    /// Apply `ops` atomically: either every op lands or none does
    pub fn run_batch(&self, ops: Vec<PendingOp>) -> Result<(), SyncError> {
        if ops.is_empty() {
            return Ok(());
        }

        let _write = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let changes = {
            let mut conn = self.connection()?;
            let tx = conn
                .transaction()
                .map_err(|e| SyncError::BatchCommit(e.to_string()))?;

            let mut changes = ChangeSet::default();
            for op in &ops {
                op.apply(&tx)
                    .map_err(|e| SyncError::BatchCommit(e.to_string()))?;
                op.record(&mut changes);
            }

            tx.commit()
                .map_err(|e| SyncError::BatchCommit(e.to_string()))?;
            changes
        };

        self.committed_batches.fetch_add(1, Ordering::SeqCst);
        debug!("Committed batch of {} ops", ops.len());

        self.notify(&changes);
        Ok(())
    }

    /// Subscription stream write path: refresh name, kind and unread sets
    pub fn upsert_subscription(&self, sub: &ParentSubscription) -> Result<(), SyncError> {
        self.run_batch(vec![PendingOp::UpsertSubscription(sub.clone())])
    }

    /// Forget the watermark so the next attach performs a full paginated load
    pub fn reset_watermark(&self, subscription_id: &str) -> Result<(), SyncError> {
        self.run_batch(vec![PendingOp::prepare_watermark(subscription_id, None)])
    }

    /// Number of batches committed through this handle and its clones
    pub fn committed_batches(&self) -> u64 {
        self.committed_batches.load(Ordering::SeqCst)
    }

    fn notify(&self, changes: &ChangeSet) {
        if changes.is_empty() {
            return;
        }

        let (records, queries) = self.observers.targets(changes);

        for (observer_id, sub_id, tx) in records {
            match self.find_subscription(&sub_id) {
                Ok(sub) => {
                    if tx.send(sub).is_err() {
                        self.observers.remove(observer_id);
                    }
                }
                Err(e) => warn!("Failed to re-read subscription {}: {}", sub_id, e),
            }
        }

        for (observer_id, query, tx) in queries {
            match self.query_threads(&query) {
                Ok(items) => {
                    if tx.send(items).is_err() {
                        self.observers.remove(observer_id);
                    }
                }
                Err(e) => warn!("Failed to re-run thread query for {}: {}", query.parent_id, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::thread_item as thread;
    use crate::utils::from_millis;

    fn store_with_room() -> ThreadStore {
        let store = ThreadStore::in_memory().expect("Failed to create in-memory store");
        store
            .upsert_subscription(&ParentSubscription::new("GENERAL", "general"))
            .expect("Failed to insert subscription");
        store
    }

    #[test]
    fn test_schema_creation() {
        let store = ThreadStore::in_memory().expect("Failed to create in-memory store");
        let conn = store.connection().expect("Failed to get connection");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"subscriptions".to_string()));
        assert!(tables.contains(&"threads".to_string()));
    }

    #[test]
    fn test_find_missing_subscription_is_not_found() {
        let store = ThreadStore::in_memory().unwrap();
        let err = store.find_subscription("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_subscription_roundtrip() {
        let store = ThreadStore::in_memory().unwrap();
        let mut sub = ParentSubscription::new("GENERAL", "general");
        sub.unread_all.insert("t1".to_string());
        sub.unread_mentioning_me.insert("t2".to_string());
        sub.last_sync_watermark = Some(from_millis(1_700_000_000_123));
        store.upsert_subscription(&sub).unwrap();

        assert_eq!(store.find_subscription("GENERAL").unwrap(), sub);
    }

    #[test]
    fn test_query_orders_by_last_message_then_id_desc() {
        let store = store_with_room();
        store
            .run_batch(vec![
                PendingOp::prepare_create(thread("a", "GENERAL", 1_000)),
                PendingOp::prepare_create(thread("c", "GENERAL", 2_000)),
                PendingOp::prepare_create(thread("b", "GENERAL", 2_000)),
                PendingOp::prepare_create(thread("d", "GENERAL", 500)),
            ])
            .unwrap();

        let ids: Vec<String> = store
            .query_threads(&ThreadQuery::for_parent("GENERAL"))
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "a", "d"]);
    }

    #[test]
    fn test_failed_batch_rolls_back_everything() {
        let store = store_with_room();
        store
            .run_batch(vec![PendingOp::prepare_create(thread("a", "GENERAL", 1_000))])
            .unwrap();
        assert_eq!(store.committed_batches(), 2);

        // Second create of "a" violates the primary key
        let err = store
            .run_batch(vec![
                PendingOp::prepare_create(thread("b", "GENERAL", 1_000)),
                PendingOp::prepare_watermark("GENERAL", Some(from_millis(5_000))),
                PendingOp::prepare_create(thread("a", "GENERAL", 1_000)),
            ])
            .unwrap_err();
        assert!(matches!(err, SyncError::BatchCommit(_)));

        assert_eq!(store.count_threads("GENERAL").unwrap(), 1);
        assert_eq!(store.find_subscription("GENERAL").unwrap().last_sync_watermark, None);
        assert_eq!(store.committed_batches(), 2);
    }

    #[test]
    fn test_update_and_destroy() {
        let store = store_with_room();
        let original = thread("a", "GENERAL", 1_000);
        store
            .run_batch(vec![PendingOp::prepare_create(original.clone())])
            .unwrap();

        store
            .run_batch(vec![PendingOp::prepare_update(&original, |t| {
                t.payload.reply_count = 9;
                t.draft_message = Some("half a reply".to_string());
            })])
            .unwrap();
        let updated = store.find_thread("a").unwrap();
        assert_eq!(updated.payload.reply_count, 9);
        assert_eq!(updated.draft_message.as_deref(), Some("half a reply"));

        store
            .run_batch(vec![PendingOp::prepare_destroy(&updated)])
            .unwrap();
        assert!(store.find_thread("a").unwrap_err().is_not_found());

        // Destroying an absent id is a no-op
        store
            .run_batch(vec![PendingOp::prepare_destroy(&updated)])
            .unwrap();
    }

    #[test]
    fn test_watermark_on_missing_subscription_fails_batch() {
        let store = ThreadStore::in_memory().unwrap();
        let err = store
            .run_batch(vec![PendingOp::prepare_watermark("ghost", Some(from_millis(1)))])
            .unwrap_err();
        assert!(matches!(err, SyncError::BatchCommit(_)));
    }

    #[test]
    fn test_observers_receive_initial_and_committed_values() {
        let store = store_with_room();
        let (sub_rx, sub_handle) = store.observe_subscription("GENERAL").unwrap();
        let (list_rx, list_handle) = store
            .observe_threads(ThreadQuery::for_parent("GENERAL"))
            .unwrap();

        assert_eq!(sub_rx.try_recv().unwrap().id, "GENERAL");
        assert!(list_rx.try_recv().unwrap().is_empty());

        store
            .run_batch(vec![
                PendingOp::prepare_create(thread("a", "GENERAL", 1_000)),
                PendingOp::prepare_watermark("GENERAL", Some(from_millis(2_000))),
            ])
            .unwrap();

        assert_eq!(
            sub_rx.try_recv().unwrap().last_sync_watermark,
            Some(from_millis(2_000))
        );
        assert_eq!(list_rx.try_recv().unwrap().len(), 1);

        assert_eq!(store.observer_count(), 2);
        sub_handle.unsubscribe();
        drop(list_handle);
        assert_eq!(store.observer_count(), 0);

        store
            .run_batch(vec![PendingOp::prepare_create(thread("b", "GENERAL", 1_000))])
            .unwrap();
        assert!(list_rx.try_recv().is_err());
    }

    #[test]
    fn test_observer_for_other_parent_is_not_notified() {
        let store = store_with_room();
        store
            .upsert_subscription(&ParentSubscription::new("RANDOM", "random"))
            .unwrap();
        let (rx, _handle) = store
            .observe_threads(ThreadQuery::for_parent("RANDOM"))
            .unwrap();
        rx.try_recv().unwrap();

        store
            .run_batch(vec![PendingOp::prepare_create(thread("a", "GENERAL", 1_000))])
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_concurrent_writers_notify_in_commit_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ThreadStore::open(dir.path().join("threads.db"), 4).unwrap();
        store
            .upsert_subscription(&ParentSubscription::new("GENERAL", "general"))
            .unwrap();
        let (rx, _handle) = store.observe_subscription("GENERAL").unwrap();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let mut sub = ParentSubscription::new("GENERAL", "general");
                        sub.unread_all.insert(format!("w{}-{}", w, i));
                        store.upsert_subscription(&sub).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let last = rx.drain().last().unwrap();
        assert_eq!(last, store.find_subscription("GENERAL").unwrap());
    }

    #[test]
    fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("threads.db");

        {
            let store = ThreadStore::open(&path, 2).unwrap();
            store
                .upsert_subscription(&ParentSubscription::new("GENERAL", "general"))
                .unwrap();
            store
                .run_batch(vec![PendingOp::prepare_create(thread("a", "GENERAL", 1_000))])
                .unwrap();
        }

        let reopened = ThreadStore::open(&path, 2).unwrap();
        assert_eq!(reopened.find_thread("a").unwrap().parent_id, "GENERAL");
    }
}
