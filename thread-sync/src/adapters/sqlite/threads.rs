use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::error::SyncError;
use crate::types::{ThreadAuthor, ThreadItem, ThreadPayload};
use crate::utils::{from_millis, now_utc, to_millis};

const COLUMNS: &str = "id, subscription_id, last_message_at, msg, author_id, author_username,
    author_name, reply_count, participant_ids, attachment_count, remote_created_at,
    remote_updated_at, draft_message";

/// Threads of one subscription, in list order
///
/// Ordered by last activity, newest first; ties broken by id, descending, so
/// offsets stay stable between identical queries.
pub fn list_for_subscription(
    conn: &Connection,
    subscription_id: &str,
) -> Result<Vec<ThreadItem>, SyncError> {
    let sql = format!(
        "SELECT {} FROM threads WHERE subscription_id = ?1
         ORDER BY last_message_at DESC, id DESC",
        COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![subscription_id], row_to_thread)?;
    let mut threads = Vec::new();
    for row in rows {
        threads.push(row?);
    }
    Ok(threads)
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<ThreadItem>, SyncError> {
    let sql = format!("SELECT {} FROM threads WHERE id = ?1", COLUMNS);
    let thread = conn.query_row(&sql, params![id], row_to_thread).optional()?;
    Ok(thread)
}

pub fn count_for_subscription(conn: &Connection, subscription_id: &str) -> Result<usize, SyncError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM threads WHERE subscription_id = ?1",
        params![subscription_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// Plain insert; an existing id violates the primary key and fails the batch
pub fn insert(conn: &Connection, thread: &ThreadItem) -> Result<(), SyncError> {
    let p = &thread.payload;
    conn.execute(
        "INSERT INTO threads (id, subscription_id, last_message_at, msg, author_id, author_username,
            author_name, reply_count, participant_ids, attachment_count, remote_created_at,
            remote_updated_at, draft_message, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            thread.id,
            thread.parent_id,
            to_millis(thread.last_message_at),
            p.msg,
            p.author.id,
            p.author.username,
            p.author.name,
            p.reply_count,
            serde_json::to_string(&p.participant_ids)?,
            p.attachment_count,
            to_millis(p.created_at),
            to_millis(p.updated_at),
            thread.draft_message,
            to_millis(now_utc()),
        ],
    )?;
    Ok(())
}

/// Replace every column of an existing row
pub fn update(conn: &Connection, thread: &ThreadItem) -> Result<(), SyncError> {
    let p = &thread.payload;
    let changed = conn.execute(
        "UPDATE threads SET
            subscription_id = ?2,
            last_message_at = ?3,
            msg = ?4,
            author_id = ?5,
            author_username = ?6,
            author_name = ?7,
            reply_count = ?8,
            participant_ids = ?9,
            attachment_count = ?10,
            remote_created_at = ?11,
            remote_updated_at = ?12,
            draft_message = ?13,
            updated_at = ?14
         WHERE id = ?1",
        params![
            thread.id,
            thread.parent_id,
            to_millis(thread.last_message_at),
            p.msg,
            p.author.id,
            p.author.username,
            p.author.name,
            p.reply_count,
            serde_json::to_string(&p.participant_ids)?,
            p.attachment_count,
            to_millis(p.created_at),
            to_millis(p.updated_at),
            thread.draft_message,
            to_millis(now_utc()),
        ],
    )?;
    if changed == 0 {
        return Err(SyncError::NotFound(format!("thread {}", thread.id)));
    }
    Ok(())
}

/// Permanently delete a row; deleting an absent id is a no-op
pub fn delete(conn: &Connection, id: &str) -> Result<(), SyncError> {
    conn.execute("DELETE FROM threads WHERE id = ?1", params![id])?;
    Ok(())
}

fn row_to_thread(row: &Row) -> Result<ThreadItem, rusqlite::Error> {
    let participants_json: String = row.get(8)?;
    let participant_ids: Vec<String> = serde_json::from_str(&participants_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(ThreadItem {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        last_message_at: from_millis(row.get(2)?),
        payload: ThreadPayload {
            msg: row.get(3)?,
            author: ThreadAuthor {
                id: row.get(4)?,
                username: row.get(5)?,
                name: row.get(6)?,
            },
            reply_count: row.get(7)?,
            participant_ids,
            attachment_count: row.get(9)?,
            created_at: from_millis(row.get(10)?),
            updated_at: from_millis(row.get(11)?),
        },
        draft_message: row.get(12)?,
    })
}
