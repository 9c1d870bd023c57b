//! Error types for queue operations.

use std::fmt;

use thiserror::Error;

/// Structured classification for queue/database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/foreign-key/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Expected row was not found.
    RowNotFound,
    /// Filesystem or transport IO failure.
    Io,
    /// SQL protocol/driver error.
    Protocol,
    /// Row could not be decoded into the expected type.
    Decode,
    /// Unclassified database failure.
    Other,
}

impl QueueDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::RowNotFound => Self::RowNotFound,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Protocol(_) => Self::Protocol,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => Self::Decode,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }

    /// Whether this failure means the store could not be reached at all.
    ///
    /// Callers must not assume any write went through when this is true.
    #[must_use]
    pub fn is_connectivity(self) -> bool {
        matches!(
            self,
            Self::BusyOrLocked | Self::PoolTimeout | Self::PoolClosed | Self::Io | Self::Protocol
        )
    }
}

impl fmt::Display for QueueDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::RowNotFound => "row_not_found",
            Self::Io => "io",
            Self::Protocol => "protocol",
            Self::Decode => "decode",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> QueueDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return QueueDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_foreign_key_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return QueueDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("database is busy")
    {
        return QueueDbErrorKind::BusyOrLocked;
    }

    QueueDbErrorKind::Other
}

/// Errors that can occur during queue and record store operations.
#[derive(Debug, Clone, Error)]
pub enum QueueError {
    /// The store could not be reached (pool exhausted/closed, IO, lock timeout).
    ///
    /// Transient: the worker loop keeps running and retries on its next pass.
    #[error("store unavailable ({kind}): {message}")]
    StoreUnavailable {
        /// Which connectivity failure occurred.
        kind: QueueDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// Any other database failure.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: QueueDbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// A stored JSON column could not be encoded or decoded.
    #[error("invalid stored value for {field}: {message}")]
    Serialization {
        /// Column that failed.
        field: &'static str,
        /// Underlying serde message.
        message: String,
    },
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        let kind = QueueDbErrorKind::from_sqlx(&err);
        let message = err.to_string();
        if kind.is_connectivity() {
            Self::StoreUnavailable { kind, message }
        } else {
            Self::Database { kind, message }
        }
    }
}

impl QueueError {
    /// Creates a serialization error for a JSON column.
    #[must_use]
    pub fn serialization(field: &'static str, err: &serde_json::Error) -> Self {
        Self::Serialization {
            field,
            message: err.to_string(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<QueueDbErrorKind> {
        match self {
            Self::StoreUnavailable { kind, .. } | Self::Database { kind, .. } => Some(*kind),
            Self::Serialization { .. } => None,
        }
    }

    /// Returns true when the store could not be reached.
    #[must_use]
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}
