//! Selector-driven HTML parser.

use scraper::{ElementRef, Html, Selector};

use super::{PageParser, ParseError, ParsedPage};

/// Href fragment identifying links to other item pages.
pub const DEFAULT_RELATED_LINK_PATTERN: &str = "/store/apps/details";

const HEADING_SELECTOR: &str = "h1";
const TITLE_SELECTOR: &str = "title";
const CATEGORY_SELECTOR: &str = "[itemprop='genre']";
const META_SELECTOR: &str = "meta[itemprop][content], meta[property][content]";
const LINK_SELECTOR: &str = "a[href]";

/// Generic HTML parser.
///
/// - title: first non-empty `<h1>`, else `<title>`
/// - category: text (or `content`) of the first `itemprop="genre"` element
/// - attributes: every `<meta itemprop|property=... content=...>`
/// - related: hrefs containing the configured pattern, in page order
#[derive(Debug, Clone)]
pub struct HtmlPageParser {
    heading: Selector,
    title: Selector,
    category: Selector,
    meta: Selector,
    links: Selector,
    related_pattern: String,
}

impl HtmlPageParser {
    /// Creates a parser whose related links contain `related_pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidSelector`] if a built-in selector fails to compile.
    pub fn new(related_pattern: impl Into<String>) -> Result<Self, ParseError> {
        Ok(Self {
            heading: compile(HEADING_SELECTOR)?,
            title: compile(TITLE_SELECTOR)?,
            category: compile(CATEGORY_SELECTOR)?,
            meta: compile(META_SELECTOR)?,
            links: compile(LINK_SELECTOR)?,
            related_pattern: related_pattern.into(),
        })
    }

    /// Creates a parser using [`DEFAULT_RELATED_LINK_PATTERN`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidSelector`] if a built-in selector fails to compile.
    pub fn with_defaults() -> Result<Self, ParseError> {
        Self::new(DEFAULT_RELATED_LINK_PATTERN)
    }
}

fn compile(source: &str) -> Result<Selector, ParseError> {
    Selector::parse(source).map_err(|e| ParseError::InvalidSelector {
        selector: source.to_string(),
        reason: format!("{e:?}"),
    })
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() { None } else { Some(text) }
}

impl PageParser for HtmlPageParser {
    fn parse_record(&self, body: &str, url: &str) -> Result<ParsedPage, ParseError> {
        let document = Html::parse_document(body);

        let title = document
            .select(&self.heading)
            .find_map(element_text)
            .or_else(|| document.select(&self.title).find_map(element_text))
            .ok_or_else(|| ParseError::missing("title", url))?;

        let category = document.select(&self.category).find_map(|element| {
            element
                .value()
                .attr("content")
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .or_else(|| element_text(element))
        });

        let mut attributes = std::collections::BTreeMap::new();
        for element in document.select(&self.meta) {
            let value = element.value();
            let Some(name) = value.attr("itemprop").or_else(|| value.attr("property")) else {
                continue;
            };
            let Some(content) = value.attr("content") else {
                continue;
            };
            attributes
                .entry(name.to_string())
                .or_insert_with(|| content.trim().to_string());
        }

        Ok(ParsedPage {
            title: Some(title),
            category,
            attributes,
        })
    }

    fn parse_related(&self, body: &str) -> Result<Vec<String>, ParseError> {
        let document = Html::parse_document(body);

        let related: Vec<String> = document
            .select(&self.links)
            .filter_map(|element| element.value().attr("href"))
            .filter(|href| href.contains(&self.related_pattern))
            .map(str::to_string)
            .collect();

        if related.is_empty() {
            return Err(ParseError::NoRelatedItems);
        }
        Ok(related)
    }
}
