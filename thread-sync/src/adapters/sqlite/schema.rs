use rusqlite::Connection;

use crate::types::error::SyncError;

pub fn initialize_schema(conn: &Connection) -> Result<(), SyncError> {
    conn.execute_batch("
        -- Parent conversations. Rows arrive from the subscription stream;
        -- the sync engine only ever touches last_thread_sync.
        CREATE TABLE IF NOT EXISTS subscriptions (
            id                TEXT PRIMARY KEY,   -- remote room id
            name              TEXT NOT NULL DEFAULT '',
            kind              TEXT NOT NULL DEFAULT 'c',
            last_thread_sync  INTEGER,            -- unix epoch ms, NULL until first load
            tunread           TEXT NOT NULL DEFAULT '[]',  -- JSON array of thread ids
            tunread_user      TEXT NOT NULL DEFAULT '[]',  -- JSON array of thread ids
            tunread_group     TEXT NOT NULL DEFAULT '[]',  -- JSON array of thread ids
            updated_at        INTEGER NOT NULL
        );

        -- Cached thread list (cache of remote data)
        CREATE TABLE IF NOT EXISTS threads (
            id                TEXT PRIMARY KEY,   -- remote thread id
            subscription_id   TEXT NOT NULL REFERENCES subscriptions(id) ON DELETE CASCADE,
            last_message_at   INTEGER NOT NULL,   -- unix epoch ms (tlm, or ts when unanswered)
            msg               TEXT NOT NULL DEFAULT '',
            author_id         TEXT NOT NULL,
            author_username   TEXT NOT NULL,
            author_name       TEXT,
            reply_count       INTEGER NOT NULL DEFAULT 0,
            participant_ids   TEXT NOT NULL DEFAULT '[]',  -- JSON array of user ids
            attachment_count  INTEGER NOT NULL DEFAULT 0,
            remote_created_at INTEGER NOT NULL,
            remote_updated_at INTEGER NOT NULL,

            -- Local-only
            draft_message     TEXT,
            updated_at        INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_threads_list
            ON threads(subscription_id, last_message_at DESC, id DESC);
    ")?;

    Ok(())
}
