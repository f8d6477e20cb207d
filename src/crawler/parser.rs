//! List page and detail page parsing
//!
//! This module handles turning a fetched page into crawl data:
//! - `(id, name)` items of a list page, whose ids are canonical hrefs
//! - Block-page detection (anti-bot challenge markers)
//! - Listing detail payloads for the detail pass

use crate::config::SiteConfig;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use url::Url;

/// The page was fetched but its content is not what a list page looks like
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No list container on {url}")]
    MissingList { url: String },

    #[error("Item without link on {url}")]
    MalformedItem { url: String },

    #[error("Invalid selector '{selector}'")]
    InvalidSelector { selector: String },

    #[error("Invalid base URL '{url}'")]
    InvalidBaseUrl { url: String },
}

/// One entry of a list page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// Canonical href of the item's page
    pub id: String,
    /// Display label
    pub name: String,
}

impl ParsedItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Extracts list items from a page and recognises block pages
pub trait ListingParser: Send + Sync {
    /// Parses the items listed on a page
    ///
    /// `Ok(vec![])` means a well-formed list page with no entries.
    fn parse_items(&self, content: &str, url: &Url) -> Result<Vec<ParsedItem>, ParseError>;

    /// Returns true if the page is a block/challenge page instead of content
    fn is_block_page(&self, content: &str) -> bool;
}

/// Extracts the structured detail of a listing page
pub trait DetailParser: Send + Sync {
    /// Returns `Ok(None)` when the page holds no recognisable detail
    fn parse_detail(&self, content: &str, url: &Url) -> Result<Option<Value>, ParseError>;
}

/// CSS-selector driven `ListingParser`
pub struct HtmlListingParser {
    base_url: Url,
    list_selector: Selector,
    item_selector: Selector,
    block_signatures: Vec<String>,
}

impl HtmlListingParser {
    /// Builds a parser from the site description
    pub fn from_site(site: &SiteConfig) -> Result<Self, ParseError> {
        Ok(Self {
            base_url: Url::parse(&site.base_url).map_err(|_| ParseError::InvalidBaseUrl {
                url: site.base_url.clone(),
            })?,
            list_selector: parse_selector(&site.list_selector)?,
            item_selector: parse_selector(&site.item_selector)?,
            block_signatures: site.block_signatures.clone(),
        })
    }

    /// Turns an href into a node id
    ///
    /// Links on the crawled host are kept as path (and query) so ids stay
    /// stable if the scheme or host alias changes; foreign links stay absolute.
    fn canonical_id(&self, href: &str, page_url: &Url) -> Option<String> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }

        let mut absolute = page_url.join(href).ok()?;
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            return None;
        }
        absolute.set_fragment(None);

        if absolute.host_str() == self.base_url.host_str() {
            let mut id = absolute.path().to_string();
            if let Some(query) = absolute.query() {
                id.push('?');
                id.push_str(query);
            }
            Some(id)
        } else {
            Some(absolute.to_string())
        }
    }
}

impl ListingParser for HtmlListingParser {
    fn parse_items(&self, content: &str, url: &Url) -> Result<Vec<ParsedItem>, ParseError> {
        let document = Html::parse_document(content);

        let list = document
            .select(&self.list_selector)
            .next()
            .ok_or_else(|| ParseError::MissingList {
                url: url.to_string(),
            })?;

        let mut items = Vec::new();
        for element in list.select(&self.item_selector) {
            let href = element
                .value()
                .attr("href")
                .ok_or_else(|| ParseError::MalformedItem {
                    url: url.to_string(),
                })?;

            match self.canonical_id(href, url) {
                Some(id) => items.push(ParsedItem::new(id, element_text(&element))),
                None => tracing::debug!("Skipping non-page link {} on {}", href, url),
            }
        }

        Ok(items)
    }

    fn is_block_page(&self, content: &str) -> bool {
        self.block_signatures
            .iter()
            .any(|signature| content.contains(signature.as_str()))
    }
}

/// `DetailParser` collecting the text of configured fields
pub struct HtmlDetailParser {
    fields: Vec<(String, Selector)>,
}

impl HtmlDetailParser {
    pub fn new(fields: &BTreeMap<String, String>) -> Result<Self, ParseError> {
        let fields = fields
            .iter()
            .map(|(name, selector)| Ok((name.clone(), parse_selector(selector)?)))
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(Self { fields })
    }
}

impl DetailParser for HtmlDetailParser {
    fn parse_detail(&self, content: &str, _url: &Url) -> Result<Option<Value>, ParseError> {
        let document = Html::parse_document(content);
        let mut detail = Map::new();

        for (name, selector) in &self.fields {
            if let Some(element) = document.select(selector).next() {
                let text = element_text(&element);
                if !text.is_empty() {
                    detail.insert(name.clone(), Value::String(text));
                }
            }
        }

        Ok((!detail.is_empty()).then_some(Value::Object(detail)))
    }
}

fn parse_selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector).map_err(|_| ParseError::InvalidSelector {
        selector: selector.to_string(),
    })
}

/// Element text with whitespace runs collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
