//! Remote threads API
//!
//! The server is the source of truth. Two reads are needed: an offset page
//! of a room's threads, and the changes to that list since a timestamp.

mod http;

pub use http::HttpThreadsApi;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::error::SyncError;
use crate::types::{RemoteThread, RemoteThreadRef};

/// One page of a paginated thread list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadPage {
    pub items: Vec<RemoteThread>,
    /// Number of threads the server says it returned
    pub count: usize,
}

/// Changes to a thread list since a point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadDelta {
    pub updated: Vec<RemoteThread>,
    pub removed: Vec<RemoteThreadRef>,
}

#[async_trait]
pub trait ThreadsApi: Send + Sync {
    /// Fetch `page_size` threads of `parent_id` starting at `offset`
    async fn fetch_page(
        &self,
        parent_id: &str,
        page_size: usize,
        offset: usize,
    ) -> Result<ThreadPage, SyncError>;

    /// Fetch threads of `parent_id` created, changed or removed after `since`
    async fn fetch_delta(
        &self,
        parent_id: &str,
        since: DateTime<Utc>,
    ) -> Result<ThreadDelta, SyncError>;
}
