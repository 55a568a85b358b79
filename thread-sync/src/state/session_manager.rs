//! Attached thread list sessions
//!
//! Holds at most one session per parent id, sharing one store and one remote
//! API client between them.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::adapters::remote::ThreadsApi;
use crate::adapters::sqlite::ThreadStore;
use crate::config::SyncConfig;
use crate::sync::ThreadListSession;
use crate::types::error::SyncError;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<ThreadListSession>>>,
    store: ThreadStore,
    api: Arc<dyn ThreadsApi>,
    config: SyncConfig,
}

impl SessionManager {
    pub fn new(store: ThreadStore, api: Arc<dyn ThreadsApi>, config: SyncConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            api,
            config,
        }
    }

    pub fn store(&self) -> &ThreadStore {
        &self.store
    }

    /// Get the attached session for a parent, attaching one if needed
    pub async fn get_or_attach(&self, parent_id: &str) -> Result<Arc<ThreadListSession>, SyncError> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(parent_id) {
                return Ok(session.clone());
            }
        }

        let mut sessions = self.sessions.write().await;
        // Another caller may have attached while we waited for the write lock
        if let Some(session) = sessions.get(parent_id) {
            return Ok(session.clone());
        }

        info!("Creating session for parent: {}", parent_id);
        let session =
            ThreadListSession::attach(parent_id, self.store.clone(), self.api.clone(), &self.config)?;
        sessions.insert(parent_id.to_string(), session.clone());
        Ok(session)
    }

    pub async fn get(&self, parent_id: &str) -> Option<Arc<ThreadListSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(parent_id).cloned()
    }

    /// Detach and forget the session for a parent
    pub async fn detach(&self, parent_id: &str) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.remove(parent_id) {
            session.detach();
        }
    }

    /// Detach and re-attach, picking the sync mode afresh
    pub async fn reattach(&self, parent_id: &str) -> Result<Arc<ThreadListSession>, SyncError> {
        self.detach(parent_id).await;
        self.get_or_attach(parent_id).await
    }

    pub async fn detach_all(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, session) in sessions.drain() {
            session.detach();
        }
    }

    pub async fn parent_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }
}
