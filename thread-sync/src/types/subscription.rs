use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The conversation that owns a thread list, as cached locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentSubscription {
    pub id: String,
    pub name: String,
    /// Conversation type code (`c` channel, `p` private group, `d` direct)
    pub kind: String,
    /// Everything up to this instant has been reconciled; `None` until the first load
    pub last_sync_watermark: Option<DateTime<Utc>>,
    /// Threads with any unread reply
    pub unread_all: BTreeSet<String>,
    /// Threads with an unread reply mentioning the current user
    pub unread_mentioning_me: BTreeSet<String>,
    /// Threads with an unread reply mentioning a group the user belongs to
    pub unread_mentioning_group: BTreeSet<String>,
}

impl ParentSubscription {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: "c".to_string(),
            last_sync_watermark: None,
            unread_all: BTreeSet::new(),
            unread_mentioning_me: BTreeSet::new(),
            unread_mentioning_group: BTreeSet::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == "d"
    }
}
