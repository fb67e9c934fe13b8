//! Error types for the grandline core library.

use thiserror::Error;

use crate::types::RecordKey;

/// Top-level error type for all grandline operations.
#[derive(Error, Debug)]
pub enum GrandlineError {
    /// A referenced guild, member or record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What kind of entity was looked up (guild, member, item, ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// A user-supplied argument is outside the accepted set.
    #[error("{0}")]
    InvalidArgument(String),

    /// A persistence or transport call failed; safe to retry later.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A versioned write found the record changed underneath it.
    #[error("Write conflict on {key}: expected version {expected}, found {found}")]
    Conflict {
        /// Record that was written.
        key: RecordKey,
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        found: u64,
    },

    /// The action is still cooling down.
    #[error("Still recovering, try again in {remaining_secs}s")]
    Cooldown {
        /// Seconds until the action is available again.
        remaining_secs: i64,
    },

    /// An interactive wait for user input ran out.
    #[error("No reply within {0}ms")]
    TimeoutExpired(u64),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GrandlineError {
    /// Shorthand for [`GrandlineError::NotFound`].
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether this error came from the storage or transport layer rather
    /// than from the request itself.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransientIo(_) | Self::Database(_) | Self::Io(_) | Self::Conflict { .. }
        )
    }

    /// Whether the message is safe and useful to show to the invoking user.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_) | Self::Cooldown { .. } | Self::NotFound { .. }
        )
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, GrandlineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(GrandlineError::TransientIo("disk".into()).is_transient());
        assert!(!GrandlineError::InvalidArgument("nope".into()).is_transient());
        assert!(GrandlineError::Cooldown { remaining_secs: 3 }.is_user_facing());
        assert!(!GrandlineError::Serialization("bad".into()).is_user_facing());
    }

    #[test]
    fn not_found_message() {
        let err = GrandlineError::not_found("guild", 42);
        assert_eq!(err.to_string(), "guild not found: 42");
    }
}
