//! Page parsing collaborator.
//!
//! The worker loop only needs two things from a fetched page: the record to
//! persist and the identifiers of related items. Which fields make up a record
//! is the parser's business; [`HtmlPageParser`] is a generic default driven by
//! CSS selectors.

mod error;
mod html;

pub use error::ParseError;
pub use html::{DEFAULT_RELATED_LINK_PATTERN, HtmlPageParser};

use std::collections::BTreeMap;

/// Fields extracted from one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    /// Page title.
    pub title: Option<String>,
    /// Category/partition, when the page declares one.
    pub category: Option<String>,
    /// Other named fields.
    pub attributes: BTreeMap<String, String>,
}

/// Maps fetched documents to structured data.
///
/// Both methods are pure; they may fail independently of each other.
pub trait PageParser: Send + Sync {
    /// Extracts the record fields for the page at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when the page does not contain a valid record.
    fn parse_record(&self, body: &str, url: &str) -> Result<ParsedPage, ParseError>;

    /// Extracts identifiers of related items, as they appear on the page.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`] when none can be found.
    fn parse_related(&self, body: &str) -> Result<Vec<String>, ParseError>;
}
