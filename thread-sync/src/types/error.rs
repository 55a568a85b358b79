//! Unified error types for the sync engine
//!
//! This module defines error types that:
//! - Are serializable so a presentation layer can show them
//! - Separate lookup misses, transport failures and store write failures
//! - Never abort the process; every error is scoped to one sync attempt

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for store, remote and engine operations
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup miss. For the parent subscription this selects degraded mode.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Network or remote-side failure (connection, 5xx, `success: false`)
    #[error("Transport error: {0}")]
    Transport(String),

    /// An atomic batch was rejected and rolled back as a whole
    #[error("Batch commit failed: {0}")]
    BatchCommit(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}

// Implement From for common error types

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Parse(err.to_string())
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<r2d2::Error> for SyncError {
    fn from(err: r2d2::Error) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SyncError::Parse(err.to_string())
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

impl From<String> for SyncError {
    fn from(err: String) -> Self {
        SyncError::Other(err)
    }
}

impl From<&str> for SyncError {
    fn from(err: &str) -> Self {
        SyncError::Other(err.to_string())
    }
}

/// Result type alias using SyncError
pub type Result<T> = std::result::Result<T, SyncError>;
