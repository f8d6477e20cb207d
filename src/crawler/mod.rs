//! Crawler module for walking the listing hierarchy
//!
//! This module contains the core crawling logic, including:
//! - Page transport and list page parsing behind swappable traits
//! - The block-page loop and the parse-failure cool-down governor
//! - Per-level passes and the top-down hierarchy walk
//! - The listing detail pass

mod detail;
mod driver;
mod fetcher;
mod governor;
mod parser;
mod resolver;
#[cfg(test)]
pub(crate) mod testing;
mod walker;

pub use detail::{DetailCrawlDriver, DetailOutcome, DetailReport};
pub use driver::{CrawlContext, LevelCrawlDriver, LevelReport, NodeOutcome};
pub use fetcher::{build_http_client, HttpFetcher, PageFetcher, TransportError};
pub use governor::{FailureVerdict, FetchFailure, RetryGovernor};
pub use parser::{
    DetailParser, HtmlDetailParser, HtmlListingParser, ListingParser, ParseError, ParsedItem,
};
pub use resolver::{BlockResolver, ConsoleResolver, Resolution, WaitResolver};
pub use walker::{HierarchyWalker, WalkPlan, WalkReport};

use crate::config::{BlockResolverKind, Config, CrawlerConfig};
use crate::state::ScopeFilter;
use crate::storage::SqliteStore;
use crate::{ConfigError, Result};
use std::path::Path;
use url::Url;

/// What one crawl invocation does
#[derive(Debug, Clone)]
pub enum CrawlMode {
    /// Walk parent levels top-down
    Walk(WalkPlan),
    /// Fetch listing details
    Details(ScopeFilter),
}

/// Result of one crawl invocation
#[derive(Debug, Clone)]
pub enum CrawlSummary {
    Walk(WalkReport),
    Details(DetailReport),
}

/// Builds the block resolver selected by the configuration
pub fn build_resolver(config: &CrawlerConfig) -> Box<dyn BlockResolver> {
    match config.block_resolver {
        BlockResolverKind::Console => Box::new(ConsoleResolver),
        BlockResolverKind::Wait => Box::new(WaitResolver::new(config.block_wait())),
    }
}

/// Runs a crawl against the configured site and database
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open (or create) the database
/// 2. Build the HTTP fetcher, parsers and block resolver
/// 3. Run the requested walk or detail pass
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `mode` - Which passes to run
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Counters of the passes that ran
/// * `Err(AtlasError)` - A storage failure or an unresolved block page
pub async fn crawl(config: &Config, mode: CrawlMode) -> Result<CrawlSummary> {
    let mut store = SqliteStore::new(Path::new(&config.output.database_path))?;
    let fetcher = HttpFetcher::from_config(&config.user_agent)?;
    let parser = HtmlListingParser::from_site(&config.site)
        .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
    let resolver = build_resolver(&config.crawler);
    let ctx = CrawlContext::new(
        &fetcher,
        &parser,
        resolver.as_ref(),
        Url::parse(&config.site.base_url)?,
        config.crawler.clone(),
    );

    match mode {
        CrawlMode::Walk(plan) => {
            let report = HierarchyWalker::new(&mut store, &ctx, config.site.root_path.as_str())
                .walk(&plan)
                .await?;
            Ok(CrawlSummary::Walk(report))
        }
        CrawlMode::Details(filter) => {
            if config.site.detail_fields.is_empty() {
                return Err(ConfigError::Validation(
                    "detail-fields must name at least one field for the detail pass".to_string(),
                )
                .into());
            }
            let detail_parser = HtmlDetailParser::new(&config.site.detail_fields)
                .map_err(|e| ConfigError::InvalidSelector(e.to_string()))?;
            let report = DetailCrawlDriver::new(&mut store, &ctx, &detail_parser)
                .run(&filter)
                .await?;
            Ok(CrawlSummary::Details(report))
        }
    }
}
