//! thread-sync - incremental sync of a room's thread list
//!
//! Keeps a local SQLite cache of the threads of a conversation consistent
//! with the server, loading page by page the first time and by delta
//! afterwards.
//!
//! ## Module Organization
//!
//! - `adapters/`: SQLite store and remote threads API
//! - `sync/`: Sync driver, pagination, reconciliation and view binding
//! - `state/`: Application state management
//! - `types/`: Data structures and errors
//! - `config/`: Configuration management

pub mod adapters;
pub mod config;
pub mod state;
pub mod sync;
pub mod types;
pub mod utils;

#[cfg(test)]
mod testing;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter, which is debug for this crate in
/// debug builds and info everywhere in release builds.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cfg!(debug_assertions) {
            EnvFilter::new("thread_sync_lib=debug,info")
        } else {
            EnvFilter::new("info")
        }
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
