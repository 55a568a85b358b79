//! Fixtures shared by the unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::adapters::remote::{ThreadDelta, ThreadPage, ThreadsApi};
use crate::types::error::SyncError;
use crate::types::{RemoteThread, RemoteUser, ThreadAuthor, ThreadItem, ThreadPayload};
use crate::utils::from_millis;

pub fn remote_thread(id: &str, last_ms: i64) -> RemoteThread {
    RemoteThread {
        id: id.to_string(),
        rid: "GENERAL".to_string(),
        msg: format!("root {}", id),
        ts: from_millis(last_ms - 1_000),
        u: RemoteUser {
            id: "u1".to_string(),
            username: "alice".to_string(),
            name: Some("Alice".to_string()),
        },
        updated_at: from_millis(last_ms),
        tlm: Some(from_millis(last_ms)),
        tcount: 1,
        replies: vec!["u2".to_string()],
        attachments: Vec::new(),
    }
}

/// `n` remote threads with ids `{prefix}-000`, `{prefix}-001`, ...
pub fn remote_page(prefix: &str, n: usize) -> Vec<RemoteThread> {
    (0..n)
        .map(|i| remote_thread(&format!("{}-{:03}", prefix, i), 1_000_000 - i as i64))
        .collect()
}

pub fn thread_item(id: &str, parent: &str, last_ms: i64) -> ThreadItem {
    ThreadItem {
        id: id.to_string(),
        parent_id: parent.to_string(),
        last_message_at: from_millis(last_ms),
        payload: ThreadPayload {
            msg: format!("root {}", id),
            author: ThreadAuthor {
                id: "u1".to_string(),
                username: "alice".to_string(),
                name: None,
            },
            created_at: from_millis(last_ms - 1_000),
            updated_at: from_millis(last_ms),
            reply_count: 1,
            participant_ids: vec!["u2".to_string()],
            attachment_count: 0,
        },
        draft_message: None,
    }
}

#[derive(Debug, Clone)]
pub struct DeltaCall {
    pub parent_id: String,
    pub since: DateTime<Utc>,
}

/// In-memory `ThreadsApi` answering from queued responses
///
/// Once the queue is drained, pages come back empty and deltas carry no changes.
#[derive(Default)]
pub struct ScriptedThreadsApi {
    pages: Mutex<VecDeque<Result<ThreadPage, SyncError>>>,
    deltas: Mutex<VecDeque<Result<ThreadDelta, SyncError>>>,
    page_calls: Mutex<Vec<(String, usize, usize)>>,
    delta_calls: Mutex<Vec<DeltaCall>>,
    latency: Option<Duration>,
}

impl ScriptedThreadsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn push_page(&self, items: Vec<RemoteThread>) {
        let count = items.len();
        self.pages
            .lock()
            .unwrap()
            .push_back(Ok(ThreadPage { items, count }));
    }

    pub fn push_page_error(&self, err: SyncError) {
        self.pages.lock().unwrap().push_back(Err(err));
    }

    pub fn push_delta(&self, delta: ThreadDelta) {
        self.deltas.lock().unwrap().push_back(Ok(delta));
    }

    pub fn push_delta_error(&self, err: SyncError) {
        self.deltas.lock().unwrap().push_back(Err(err));
    }

    pub fn page_calls(&self) -> Vec<(String, usize, usize)> {
        self.page_calls.lock().unwrap().clone()
    }

    pub fn delta_calls(&self) -> Vec<DeltaCall> {
        self.delta_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreadsApi for ScriptedThreadsApi {
    async fn fetch_page(
        &self,
        parent_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<ThreadPage, SyncError> {
        self.page_calls
            .lock()
            .unwrap()
            .push((parent_id.to_string(), page_size, offset));
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.pages.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ThreadPage::default()))
    }

    async fn fetch_delta(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<ThreadDelta, SyncError> {
        self.delta_calls.lock().unwrap().push(DeltaCall {
            parent_id: parent_id.to_string(),
            since,
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let next = self.deltas.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ThreadDelta::default()))
    }
}
