//! Listing detail pass
//!
//! Listings have no children. Instead each listing page is fetched once more
//! and its structured attributes are stored on the listing, tracked by the
//! listing's own `detail_status`.

use crate::crawler::driver::CrawlContext;
use crate::crawler::fetcher::TransportError;
use crate::crawler::governor::{FailureVerdict, FetchFailure, RetryGovernor};
use crate::crawler::parser::{DetailParser, ParseError};
use crate::state::{CrawlStatus, Entity, ScopeFilter};
use crate::storage::EntityStore;
use crate::{AtlasError, Result};
use serde_json::Value;
use url::Url;

/// Result of visiting one listing page
#[derive(Debug)]
pub enum DetailOutcome {
    Detail(Value),
    /// The page had none of the detail fields
    Empty,
    ParseFailed(ParseError),
    TransportFailed(TransportError),
}

/// Counters of one detail pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetailReport {
    pub selected: usize,
    pub finished: usize,
    pub empty: usize,
    pub parse_failed: usize,
    pub transport_failed: usize,
    pub cooldowns: u32,
}

/// Fetches listing pages whose detail is not yet stored
pub struct DetailCrawlDriver<'a, S> {
    store: &'a mut S,
    ctx: &'a CrawlContext<'a>,
    parser: &'a dyn DetailParser,
    governor: RetryGovernor,
}

impl<'a, S: EntityStore> DetailCrawlDriver<'a, S> {
    pub fn new(store: &'a mut S, ctx: &'a CrawlContext<'a>, parser: &'a dyn DetailParser) -> Self {
        Self {
            store,
            ctx,
            parser,
            governor: ctx.governor(),
        }
    }

    pub async fn run(&mut self, filter: &ScopeFilter) -> Result<DetailReport> {
        let listings = self.store.select_incomplete_details(filter)?;
        let mut report = DetailReport {
            selected: listings.len(),
            ..Default::default()
        };
        tracing::info!("Fetching details of {} listings", listings.len());

        let total = listings.len();
        for (index, mut listing) in listings.into_iter().enumerate() {
            let url = listing.url(&self.ctx.base_url)?;
            tracing::info!("Detail {}, {} left", url, total - index - 1);

            let outcome = self.visit(&url).await?;
            let verdict = self.apply(&mut listing, outcome, &mut report);
            self.store.save(&listing)?;

            if verdict == FailureVerdict::CoolDown {
                report.cooldowns += 1;
                self.governor.cool_down().await;
            }
        }

        tracing::info!(
            "Detail pass done: {} stored, {} empty, {} unparseable, {} failed",
            report.finished,
            report.empty,
            report.parse_failed,
            report.transport_failed
        );
        Ok(report)
    }

    async fn visit(&mut self, url: &Url) -> Result<DetailOutcome> {
        let ctx = self.ctx;
        let content = match self
            .governor
            .fetch_unblocked(ctx.fetcher, ctx.parser, ctx.resolver, url)
            .await
        {
            Ok(content) => content,
            Err(FetchFailure::Transport(e)) => return Ok(DetailOutcome::TransportFailed(e)),
            Err(FetchFailure::Unresolved { url }) => return Err(AtlasError::BlockUnresolved { url }),
        };

        Ok(match self.parser.parse_detail(&content, url) {
            Ok(Some(detail)) => DetailOutcome::Detail(detail),
            Ok(None) => DetailOutcome::Empty,
            Err(e) => DetailOutcome::ParseFailed(e),
        })
    }

    fn apply(
        &mut self,
        listing: &mut Entity,
        outcome: DetailOutcome,
        report: &mut DetailReport,
    ) -> FailureVerdict {
        let mut verdict = FailureVerdict::Continue;
        let status = match outcome {
            DetailOutcome::Detail(detail) => {
                listing.detail = Some(detail);
                self.governor.record_success();
                report.finished += 1;
                CrawlStatus::Finished
            }
            DetailOutcome::Empty => {
                report.empty += 1;
                tracing::info!("No detail on {}", listing.id);
                CrawlStatus::CrawledButEmpty
            }
            DetailOutcome::ParseFailed(e) => {
                report.parse_failed += 1;
                tracing::warn!("Parse error: {}", e);
                verdict = self.governor.record_parse_failure();
                CrawlStatus::CrawledButEmpty
            }
            DetailOutcome::TransportFailed(e) => {
                report.transport_failed += 1;
                tracing::warn!("Fetch failed: {}", e);
                CrawlStatus::FailedToCrawl
            }
        };
        listing.detail_status = Some(status);
        verdict
    }
}
