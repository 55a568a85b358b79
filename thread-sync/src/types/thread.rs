use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::truncate_millis;

/// Author of a thread's root message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadAuthor {
    pub id: String,
    pub username: String,
    pub name: Option<String>,
}

/// Remote-owned fields of a thread, replaced wholesale on every update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPayload {
    pub msg: String,
    pub author: ThreadAuthor,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reply_count: u32,
    pub participant_ids: Vec<String>,
    pub attachment_count: u32,
}

/// Cached copy of a remote thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadItem {
    /// Remote identifier, the only merge key
    pub id: String,
    /// Owning subscription
    pub parent_id: String,
    pub last_message_at: DateTime<Utc>,
    pub payload: ThreadPayload,
    /// Unsent reply text; never sent by the server
    pub draft_message: Option<String>,
}

/// Thread as returned by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteThread {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub msg: String,
    pub ts: DateTime<Utc>,
    pub u: RemoteUser,
    #[serde(rename = "_updatedAt")]
    pub updated_at: DateTime<Utc>,
    /// Timestamp of the latest reply
    #[serde(default)]
    pub tlm: Option<DateTime<Utc>>,
    /// Reply count
    #[serde(default)]
    pub tcount: u32,
    /// Ids of users who replied
    #[serde(default)]
    pub replies: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Entry of a delta's `remove` list; only the id is meaningful
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteThreadRef {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_deletedAt", default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RemoteThread {
    /// Last activity of the thread: latest reply, or the root message when unanswered
    pub fn last_message_at(&self) -> DateTime<Utc> {
        truncate_millis(self.tlm.unwrap_or(self.ts))
    }

    pub fn to_payload(&self) -> ThreadPayload {
        ThreadPayload {
            msg: self.msg.clone(),
            author: ThreadAuthor {
                id: self.u.id.clone(),
                username: self.u.username.clone(),
                name: self.u.name.clone(),
            },
            created_at: truncate_millis(self.ts),
            updated_at: truncate_millis(self.updated_at),
            reply_count: self.tcount,
            participant_ids: self.replies.clone(),
            attachment_count: self.attachments.len() as u32,
        }
    }

    /// Build a fresh local item owned by `parent_id`
    pub fn to_item(&self, parent_id: &str) -> ThreadItem {
        ThreadItem {
            id: self.id.clone(),
            parent_id: parent_id.to_string(),
            last_message_at: self.last_message_at(),
            payload: self.to_payload(),
            draft_message: None,
        }
    }
}

/// One fetch result, consumed once by the reconciler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteThreadBatch {
    pub updated: Vec<RemoteThread>,
    pub removed: Vec<RemoteThreadRef>,
    /// Watermark to record with the batch; `None` leaves it untouched
    pub as_of: Option<DateTime<Utc>>,
}

impl RemoteThreadBatch {
    /// Page of a paginated load; never carries removals
    pub fn append(updated: Vec<RemoteThread>, as_of: Option<DateTime<Utc>>) -> Self {
        Self {
            updated,
            removed: Vec::new(),
            as_of,
        }
    }

    pub fn delta(
        updated: Vec<RemoteThread>,
        removed: Vec<RemoteThreadRef>,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            updated,
            removed,
            as_of: Some(as_of),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRE: &str = r#"{
        "_id": "t1",
        "rid": "GENERAL",
        "msg": "root message",
        "ts": "2021-03-01T10:00:00.000Z",
        "u": { "_id": "u1", "username": "alice", "name": "Alice" },
        "_updatedAt": "2021-03-02T09:30:00.250Z",
        "tlm": "2021-03-02T09:30:00.000Z",
        "tcount": 4,
        "replies": ["u2", "u3"],
        "attachments": [{ "title": "a.png" }],
        "unknownField": true
    }"#;

    #[test]
    fn test_parse_wire_thread() {
        let thread: RemoteThread = serde_json::from_str(WIRE).unwrap();
        assert_eq!(thread.id, "t1");
        assert_eq!(thread.tcount, 4);
        assert_eq!(thread.u.name.as_deref(), Some("Alice"));

        let item = thread.to_item("GENERAL");
        assert_eq!(item.parent_id, "GENERAL");
        assert_eq!(item.last_message_at.to_rfc3339(), "2021-03-02T09:30:00+00:00");
        assert_eq!(item.payload.participant_ids, vec!["u2", "u3"]);
        assert_eq!(item.payload.attachment_count, 1);
        assert_eq!(item.draft_message, None);
    }

    #[test]
    fn test_unanswered_thread_uses_root_timestamp() {
        let mut thread: RemoteThread = serde_json::from_str(WIRE).unwrap();
        thread.tlm = None;
        assert_eq!(thread.last_message_at(), thread.ts);
    }

    #[test]
    fn test_parse_removed_ref() {
        let r: RemoteThreadRef =
            serde_json::from_str(r#"{"_id":"t9","_deletedAt":"2021-03-02T09:30:00.000Z"}"#).unwrap();
        assert_eq!(r.id, "t9");
        assert!(r.deleted_at.is_some());

        let bare: RemoteThreadRef = serde_json::from_str(r#"{"_id":"t10"}"#).unwrap();
        assert_eq!(bare.deleted_at, None);
    }
}
