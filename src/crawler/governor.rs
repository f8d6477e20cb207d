//! Parse-failure circuit breaker and block-page loop
//!
//! One `RetryGovernor` lives for the length of a level pass. It counts
//! consecutive parse failures and calls for a long cool-down once the
//! threshold is reached, on the assumption that a run of unparseable pages
//! means the site is serving something other than content to this client.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{PageFetcher, TransportError};
use crate::crawler::parser::ListingParser;
use crate::crawler::resolver::{BlockResolver, Resolution};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Outcome of recording a parse failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Keep crawling
    Continue,
    /// Threshold reached; the counter was reset and a cool-down is due
    CoolDown,
}

/// Why `fetch_unblocked` returned no content
#[derive(Debug, Error)]
pub enum FetchFailure {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Block page at {url} was not resolved")]
    Unresolved { url: String },
}

/// Tracks consecutive parse failures across one level pass
#[derive(Debug)]
pub struct RetryGovernor {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    cooldowns: u32,
    block_pages: u32,
}

impl RetryGovernor {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            consecutive_failures: 0,
            cooldowns: 0,
            block_pages: 0,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.failure_threshold, config.cooldown())
    }

    /// A node was crawled and its children written
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// A page was fetched but could not be parsed
    pub fn record_parse_failure(&mut self) -> FailureVerdict {
        self.consecutive_failures += 1;
        if self.consecutive_failures < self.threshold {
            return FailureVerdict::Continue;
        }

        self.consecutive_failures = 0;
        self.cooldowns += 1;
        FailureVerdict::CoolDown
    }

    /// Sleeps through the cool-down
    pub async fn cool_down(&self) {
        tracing::warn!(
            "{} consecutive parse failures, cooling down for {:?}",
            self.threshold,
            self.cooldown
        );
        tokio::time::sleep(self.cooldown).await;
        tracing::info!("Cool-down over, resuming");
    }

    /// Fetches `url`, waiting on `resolver` for as long as the site serves a
    /// block page
    ///
    /// Block pages neither count as parse failures nor end the loop on their
    /// own; only the resolver giving up does.
    pub async fn fetch_unblocked(
        &mut self,
        fetcher: &dyn PageFetcher,
        parser: &dyn ListingParser,
        resolver: &dyn BlockResolver,
        url: &Url,
    ) -> Result<String, FetchFailure> {
        loop {
            let content = fetcher.fetch_page(url).await?;
            if !parser.is_block_page(&content) {
                return Ok(content);
            }

            self.block_pages += 1;
            if resolver.await_resolution(url).await == Resolution::GiveUp {
                return Err(FetchFailure::Unresolved {
                    url: url.to_string(),
                });
            }
            tracing::debug!("Re-fetching {} after block page", url);
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Cool-downs triggered so far
    pub fn cooldowns(&self) -> u32 {
        self.cooldowns
    }

    /// Block pages encountered so far
    pub fn block_pages(&self) -> u32 {
        self.block_pages
    }
}
