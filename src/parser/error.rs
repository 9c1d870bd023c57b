//! Error types for page parsing.

use thiserror::Error;

/// Errors raised by a page parser.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// A configured CSS selector did not compile.
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector {
        /// The selector source text.
        selector: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The page lacks a field every record needs.
    #[error("required field '{field}' missing from {url}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// Page the field was expected on.
        url: String,
    },

    /// The page lists no related items.
    #[error("no related items found")]
    NoRelatedItems,
}

impl ParseError {
    /// Creates a `MissingField` error.
    #[must_use]
    pub fn missing(field: &'static str, url: &str) -> Self {
        Self::MissingField {
            field,
            url: url.to_string(),
        }
    }
}
