//! Queue item type.

use std::fmt;

use sqlx::FromRow;

/// One unit of work: a target identifier plus its claim state.
#[derive(Debug, Clone, FromRow)]
pub struct QueueItem {
    /// Row identifier.
    pub id: i64,
    /// Target identifier (absolute URL or a path relative to the configured prefix).
    pub url: String,
    /// Set only by a successful claim; at most one worker sees it true.
    pub busy: bool,
    /// When the item was last claimed, if it is busy.
    pub claimed_at: Option<String>,
    /// When the item was enqueued.
    pub created_at: String,
}

impl QueueItem {
    /// Resolves the identifier to a fetchable URL.
    ///
    /// Identifiers without an `http` scheme are treated as relative and get
    /// `prefix` prepended.
    #[must_use]
    pub fn target_url(&self, prefix: &str) -> String {
        resolve_target(&self.url, prefix)
    }
}

/// Prepends `prefix` to identifiers that are not already absolute URLs.
#[must_use]
pub fn resolve_target(identifier: &str, prefix: &str) -> String {
    if identifier.to_ascii_lowercase().contains("http") {
        identifier.to_string()
    } else {
        format!("{prefix}{identifier}")
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "QueueItem {{ id: {}, url: {}, busy: {} }}",
            self.id, self.url, self.busy
        )
    }
}
