use serde::{Deserialize, Serialize};

use super::driver::SyncMode;

/// Navigation target produced by pressing a thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSelection {
    pub parent_id: String,
    pub thread_id: String,
    /// Title for the opened thread view
    pub name: String,
}

/// Event emitted by an attached session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    ModeSelected {
        parent_id: String,
        mode: SyncMode,
    },
    PageLoaded {
        parent_id: String,
        offset: usize,
        count: usize,
        exhausted: bool,
    },
    DeltaApplied {
        parent_id: String,
        created: usize,
        updated: usize,
        deleted: usize,
    },
    SyncFailed {
        parent_id: String,
        message: String,
    },
    OpenThread(ThreadSelection),
}

impl SessionEvent {
    /// True for events that end a fetch, successful or not
    pub fn is_fetch_complete(&self) -> bool {
        matches!(
            self,
            Self::PageLoaded { .. } | Self::DeltaApplied { .. } | Self::SyncFailed { .. }
        )
    }
}
