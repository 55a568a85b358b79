use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::types::error::SyncError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Per-connection settings; run on every connection the pool opens
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;
     PRAGMA synchronous = NORMAL;
     PRAGMA cache_size = -8000;
     PRAGMA temp_store = MEMORY;";

pub fn create_pool(db_path: &Path, max_size: u32) -> Result<DbPool, SyncError> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let manager =
        SqliteConnectionManager::file(db_path).with_init(|c| c.execute_batch(CONNECTION_PRAGMAS));

    let pool = Pool::builder().max_size(max_size.max(1)).build(manager)?;

    // journal_mode is stored in the database file, so one connection is enough
    let conn = pool.get()?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;

    Ok(pool)
}

/// Single-connection in-memory pool; every checkout sees the same database
pub fn create_memory_pool() -> Result<DbPool, SyncError> {
    let manager = SqliteConnectionManager::memory()
        .with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));

    let pool = Pool::builder().max_size(1).build(manager)?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pragmas_apply_to_every_pooled_connection() {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_pool(&dir.path().join("threads.db"), 3).unwrap();

        let conns: Vec<DbConnection> = (0..3).map(|_| pool.get().unwrap()).collect();
        for conn in &conns {
            let synchronous: i64 = conn
                .query_row("PRAGMA synchronous", [], |row| row.get(0))
                .unwrap();
            let temp_store: i64 = conn
                .query_row("PRAGMA temp_store", [], |row| row.get(0))
                .unwrap();
            let foreign_keys: i64 = conn
                .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                .unwrap();
            let journal_mode: String = conn
                .query_row("PRAGMA journal_mode", [], |row| row.get(0))
                .unwrap();
            assert_eq!(synchronous, 1);
            assert_eq!(temp_store, 2);
            assert_eq!(foreign_keys, 1);
            assert_eq!(journal_mode, "wal");
        }
    }
}
