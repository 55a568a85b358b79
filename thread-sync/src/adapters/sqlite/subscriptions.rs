use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;

use crate::types::error::SyncError;
use crate::types::ParentSubscription;
use crate::utils::{from_millis, now_utc, to_millis};

const COLUMNS: &str =
    "id, name, kind, last_thread_sync, tunread, tunread_user, tunread_group";

pub fn get(conn: &Connection, id: &str) -> Result<Option<ParentSubscription>, SyncError> {
    let sql = format!("SELECT {} FROM subscriptions WHERE id = ?1", COLUMNS);
    let sub = conn
        .query_row(&sql, params![id], row_to_subscription)
        .optional()?;
    Ok(sub)
}

/// Insert or fully replace a subscription row (subscription stream write path)
pub fn upsert(conn: &Connection, sub: &ParentSubscription) -> Result<(), SyncError> {
    conn.execute(
        "INSERT INTO subscriptions (id, name, kind, last_thread_sync, tunread, tunread_user, tunread_group, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            kind = excluded.kind,
            last_thread_sync = excluded.last_thread_sync,
            tunread = excluded.tunread,
            tunread_user = excluded.tunread_user,
            tunread_group = excluded.tunread_group,
            updated_at = excluded.updated_at",
        params![
            sub.id,
            sub.name,
            sub.kind,
            sub.last_sync_watermark.map(to_millis),
            encode_set(&sub.unread_all)?,
            encode_set(&sub.unread_mentioning_me)?,
            encode_set(&sub.unread_mentioning_group)?,
            to_millis(now_utc()),
        ],
    )?;
    Ok(())
}

/// Set or clear the watermark only, leaving unread sets untouched
pub fn set_watermark(
    conn: &Connection,
    id: &str,
    watermark: Option<DateTime<Utc>>,
) -> Result<(), SyncError> {
    let changed = conn.execute(
        "UPDATE subscriptions SET last_thread_sync = ?2, updated_at = ?3 WHERE id = ?1",
        params![id, watermark.map(to_millis), to_millis(now_utc())],
    )?;
    if changed == 0 {
        return Err(SyncError::NotFound(format!("subscription {}", id)));
    }
    Ok(())
}

fn row_to_subscription(row: &Row) -> Result<ParentSubscription, rusqlite::Error> {
    let watermark: Option<i64> = row.get(3)?;
    Ok(ParentSubscription {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        last_sync_watermark: watermark.map(from_millis),
        unread_all: decode_set(row, 4)?,
        unread_mentioning_me: decode_set(row, 5)?,
        unread_mentioning_group: decode_set(row, 6)?,
    })
}

fn encode_set(set: &BTreeSet<String>) -> Result<String, SyncError> {
    Ok(serde_json::to_string(set)?)
}

fn decode_set(row: &Row, idx: usize) -> Result<BTreeSet<String>, rusqlite::Error> {
    let json: String = row.get(idx)?;
    serde_json::from_str(&json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
