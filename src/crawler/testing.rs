//! Scripted collaborators for crawl tests

use crate::config::CrawlerConfig;
use crate::crawler::driver::CrawlContext;
use crate::crawler::fetcher::{PageFetcher, TransportError};
use crate::crawler::parser::{ListingParser, ParseError, ParsedItem};
use crate::crawler::resolver::{BlockResolver, Resolution};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use url::Url;

pub const BASE_URL: &str = "https://www.example.com";
pub const BLOCK_PAGE: &str = "BLOCKED";
pub const GARBAGE_PAGE: &str = "<html>something went wrong</html>";

const LIST_HEADER: &str = "LIST";

/// Renders items in the format `LineParser` reads
pub fn list_page(items: &[(&str, &str)]) -> String {
    let mut page = LIST_HEADER.to_string();
    for (id, name) in items {
        page.push_str(&format!("\n{}|{}", id, name));
    }
    page
}

#[derive(Clone)]
enum Scripted {
    Page(String),
    Down,
}

/// Serves scripted responses by URL path
///
/// Responses queued for a path are served in order; the last one repeats.
/// Unknown paths answer 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, path: &str, content: impl Into<String>) -> Self {
        self.push(path, Scripted::Page(content.into()))
    }

    /// The path refuses connections
    pub fn down(self, path: &str) -> Self {
        self.push(path, Scripted::Down)
    }

    fn push(self, path: &str, response: Scripted) -> Self {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.as_str() == path)
            .count()
    }
}

#[async_trait]
impl PageFetcher for ScriptedFetcher {
    async fn fetch_page(&self, url: &Url) -> Result<String, TransportError> {
        let path = url.path().to_string();
        self.requests.lock().unwrap().push(path.clone());

        let mut responses = self.responses.lock().unwrap();
        let response = match responses.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };

        match response {
            Some(Scripted::Page(content)) => Ok(content),
            Some(Scripted::Down) => Err(TransportError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            None => Err(TransportError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Reads pages written by `list_page`
pub struct LineParser;

impl ListingParser for LineParser {
    fn parse_items(&self, content: &str, url: &Url) -> Result<Vec<ParsedItem>, ParseError> {
        let mut lines = content.lines();
        if lines.next() != Some(LIST_HEADER) {
            return Err(ParseError::MissingList {
                url: url.to_string(),
            });
        }

        lines
            .map(|line| {
                line.split_once('|')
                    .map(|(id, name)| ParsedItem::new(id, name))
                    .ok_or_else(|| ParseError::MalformedItem {
                        url: url.to_string(),
                    })
            })
            .collect()
    }

    fn is_block_page(&self, content: &str) -> bool {
        content == BLOCK_PAGE
    }
}

/// Resolver that retries or gives up, counting calls
pub struct ScriptedResolver {
    resolution: Resolution,
    calls: AtomicU32,
}

impl ScriptedResolver {
    pub fn retrying() -> Self {
        Self {
            resolution: Resolution::Retry,
            calls: AtomicU32::new(0),
        }
    }

    pub fn giving_up() -> Self {
        Self {
            resolution: Resolution::GiveUp,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockResolver for ScriptedResolver {
    async fn await_resolution(&self, _url: &Url) -> Resolution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.resolution
    }
}

/// Context over the scripted collaborators, with no cool-down pause
pub fn context<'a>(
    fetcher: &'a ScriptedFetcher,
    parser: &'a LineParser,
    resolver: &'a ScriptedResolver,
) -> CrawlContext<'a> {
    let settings = CrawlerConfig {
        cooldown_secs: 0,
        ..Default::default()
    };
    CrawlContext::new(
        fetcher,
        parser,
        resolver,
        Url::parse(BASE_URL).unwrap(),
        settings,
    )
}
