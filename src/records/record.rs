//! Processed record type.

use std::collections::BTreeMap;

use crate::parser::ParsedPage;
use crate::period::Period;

/// The fully-populated entity extracted for one target in one period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedRecord {
    /// Resolved target URL.
    pub url: String,
    /// Period the record was produced for; drives the freshness check.
    pub reference_date: Period,
    /// Page title, when the parser found one.
    pub title: Option<String>,
    /// Category/partition the page belongs to, when known.
    pub category: Option<String>,
    /// Remaining extracted fields.
    pub attributes: BTreeMap<String, String>,
    /// Resolved, de-duplicated identifiers of related items.
    pub related_urls: Vec<String>,
}

impl ProcessedRecord {
    /// Builds a record from parser output with no related items yet.
    #[must_use]
    pub fn from_parsed(url: impl Into<String>, reference_date: Period, page: ParsedPage) -> Self {
        Self {
            url: url.into(),
            reference_date,
            title: page.title,
            category: page.category,
            attributes: page.attributes,
            related_urls: Vec::new(),
        }
    }

    /// Attaches related identifiers, keeping first-seen order and dropping repeats.
    pub fn set_related(&mut self, urls: impl IntoIterator<Item = String>) {
        let mut related: Vec<String> = Vec::new();
        for url in urls {
            if !related.contains(&url) {
                related.push(url);
            }
        }
        self.related_urls = related;
    }
}
