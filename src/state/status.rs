//! Crawl status definitions for hierarchy nodes
//!
//! Every node carries one of these; the detail pass on listings reuses the same set.
use std::fmt;

/// Represents the crawl status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Node exists but its page has not been crawled yet
    Todo,

    /// The page could not be fetched (network or browser failure)
    FailedToCrawl,

    /// The page was fetched but yielded no items, or could not be parsed
    CrawledButEmpty,

    /// The page was crawled and its children were written
    Finished,
}

impl CrawlStatus {
    /// Returns true if the node will not be selected again
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true if this status records a failed attempt
    ///
    /// Neither failure state is terminal: the next pass re-selects the node.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedToCrawl | Self::CrawledButEmpty)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::FailedToCrawl => "failed_to_crawl",
            Self::CrawledButEmpty => "crawled_but_empty",
            Self::Finished => "finished",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "failed_to_crawl" => Some(Self::FailedToCrawl),
            "crawled_but_empty" => Some(Self::CrawledButEmpty),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Returns all statuses in lifecycle order
    pub fn all_statuses() -> [Self; 4] {
        [
            Self::Todo,
            Self::FailedToCrawl,
            Self::CrawledButEmpty,
            Self::Finished,
        ]
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
