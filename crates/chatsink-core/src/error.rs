// SPDX-FileCopyrightText: 2026 Chatsink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Chatsink sync engine.

use thiserror::Error;

use crate::types::EntityKind;

/// The primary error type used across the Chatsink workspace.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration errors (invalid TOML, missing required fields, bad tier tables).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, migration failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transient storage conflict (deadlock, lock contention, busy backend).
    ///
    /// Eligible for retry with backoff; see [`SyncError::is_transient`].
    #[error("storage conflict: {message}")]
    Conflict { message: String },

    /// Operation exceeded its transaction timeout budget.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// An incoming record has no identity field and cannot be stored.
    #[error("{kind} record is missing its identity field")]
    MissingIdentity { kind: EntityKind },

    /// An address could not be resolved to a non-empty canonical form.
    #[error("address cannot be resolved: {0:?}")]
    Unresolvable(String),

    /// A value failed JSON round-trip serialization.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Whether this error is a transient storage condition worth retrying.
    ///
    /// Covers explicit conflicts, transaction timeouts, and storage errors
    /// whose message matches the known conflict keyword set.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Conflict { .. } | SyncError::Timeout { .. } => true,
            SyncError::Storage { source } => is_conflict_message(&source.to_string()),
            _ => false,
        }
    }
}

/// Whether an error message indicates a retryable storage conflict.
pub fn is_conflict_message(message: &str) -> bool {
    const KEYWORDS: [&str; 5] = [
        "database is locked",
        "database table is locked",
        "busy",
        "deadlock",
        "conflict",
    ];
    let lower = message.to_ascii_lowercase();
    KEYWORDS.iter().any(|k| lower.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_and_timeout_are_transient() {
        let conflict = SyncError::Conflict {
            message: "database is locked".into(),
        };
        let timeout = SyncError::Timeout {
            duration: std::time::Duration::from_secs(5),
        };
        assert!(conflict.is_transient());
        assert!(timeout.is_transient());
    }

    #[test]
    fn storage_error_with_lock_message_is_transient() {
        let err = SyncError::Storage {
            source: Box::new(std::io::Error::other("database is locked")),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn non_transient_errors_are_not_retried() {
        let config = SyncError::Config("bad".into());
        let missing = SyncError::MissingIdentity {
            kind: EntityKind::Chat,
        };
        let storage = SyncError::Storage {
            source: Box::new(std::io::Error::other("no such table: chats")),
        };
        assert!(!config.is_transient());
        assert!(!missing.is_transient());
        assert!(!storage.is_transient());
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        assert!(is_conflict_message("Deadlock found when trying to get lock"));
        assert!(is_conflict_message("SQLITE_BUSY: database is locked"));
        assert!(!is_conflict_message("syntax error near SELECT"));
    }
}
