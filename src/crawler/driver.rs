//! Level crawl driver
//!
//! One pass over the incomplete nodes of a level: fetch each node's list
//! page, write its children, then record the node's new status. Children are
//! always written before the parent's status is saved, so a crash between
//! the two leaves the parent re-selectable and the children deduplicated by
//! the next pass.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{PageFetcher, TransportError};
use crate::crawler::governor::{FailureVerdict, FetchFailure, RetryGovernor};
use crate::crawler::parser::{ListingParser, ParseError, ParsedItem};
use crate::crawler::resolver::BlockResolver;
use crate::state::{CrawlStatus, Entity, Level, ScopeFilter};
use crate::storage::{BatchSink, BulkWriter, EntityStore};
use crate::{AtlasError, Result};
use std::collections::HashSet;
use url::Url;

/// Collaborators shared by every pass of a crawl
pub struct CrawlContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub parser: &'a dyn ListingParser,
    pub resolver: &'a dyn BlockResolver,
    /// Node ids are resolved against this URL
    pub base_url: Url,
    pub settings: CrawlerConfig,
}

impl<'a> CrawlContext<'a> {
    pub fn new(
        fetcher: &'a dyn PageFetcher,
        parser: &'a dyn ListingParser,
        resolver: &'a dyn BlockResolver,
        base_url: Url,
        settings: CrawlerConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            resolver,
            base_url,
            settings,
        }
    }

    pub(crate) fn governor(&self) -> RetryGovernor {
        RetryGovernor::from_config(&self.settings)
    }

    pub(crate) fn writer(&self) -> BulkWriter {
        BulkWriter::new(self.settings.minimal_chunk_size)
    }

    /// Fetches and parses one list page
    ///
    /// Only an unresolved block page is an error; every other failure is a
    /// node outcome.
    pub(crate) async fn visit(&self, governor: &mut RetryGovernor, url: &Url) -> Result<NodeOutcome> {
        let content = match governor
            .fetch_unblocked(self.fetcher, self.parser, self.resolver, url)
            .await
        {
            Ok(content) => content,
            Err(FetchFailure::Transport(e)) => return Ok(NodeOutcome::TransportFailed(e)),
            Err(FetchFailure::Unresolved { url }) => return Err(AtlasError::BlockUnresolved { url }),
        };

        Ok(match self.parser.parse_items(&content, url) {
            Ok(items) if items.is_empty() => NodeOutcome::Empty,
            Ok(items) => NodeOutcome::Children(distinct(items)),
            Err(e) => NodeOutcome::ParseFailed(e),
        })
    }
}

/// Result of visiting one node's page
#[derive(Debug)]
pub enum NodeOutcome {
    /// The page listed at least one item, distinct by id
    Children(Vec<ParsedItem>),
    /// A well-formed list page without items
    Empty,
    ParseFailed(ParseError),
    TransportFailed(TransportError),
}

/// Counters of one level pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelReport {
    pub selected: usize,
    pub finished: usize,
    pub empty: usize,
    pub parse_failed: usize,
    pub transport_failed: usize,
    pub children_inserted: usize,
    /// Children that already existed from an earlier pass
    pub children_existing: usize,
    pub cooldowns: u32,
}

impl LevelReport {
    /// Nodes left in a non-finished status by this pass
    pub fn unfinished(&self) -> usize {
        self.empty + self.parse_failed + self.transport_failed
    }
}

/// Crawls the incomplete nodes of one level
pub struct LevelCrawlDriver<'a, S> {
    store: &'a mut S,
    ctx: &'a CrawlContext<'a>,
    writer: BulkWriter,
    governor: RetryGovernor,
}

impl<'a, S> LevelCrawlDriver<'a, S>
where
    S: EntityStore + BatchSink<Entity>,
{
    pub fn new(store: &'a mut S, ctx: &'a CrawlContext<'a>) -> Self {
        Self {
            store,
            ctx,
            writer: ctx.writer(),
            governor: ctx.governor(),
        }
    }

    /// Runs one pass over the nodes of `level` matching `filter`
    ///
    /// Nodes that become incomplete during the pass are left for the next one.
    pub async fn run(&mut self, level: Level, filter: &ScopeFilter) -> Result<LevelReport> {
        if level.child().is_none() {
            return Err(AtlasError::InvalidLevel(level));
        }

        let nodes = self.store.select_incomplete(level, filter)?;
        let mut report = LevelReport {
            selected: nodes.len(),
            ..Default::default()
        };
        tracing::info!("Crawling {} incomplete {} nodes", nodes.len(), level);

        let total = nodes.len();
        for (index, mut node) in nodes.into_iter().enumerate() {
            let url = node.url(&self.ctx.base_url)?;
            tracing::info!("Crawl {}, {} left", url, total - index - 1);

            let outcome = self.ctx.visit(&mut self.governor, &url).await?;
            let verdict = self.apply(&mut node, outcome, &mut report)?;
            self.store.save(&node)?;

            if verdict == FailureVerdict::CoolDown {
                report.cooldowns += 1;
                self.governor.cool_down().await;
            }
        }

        tracing::info!(
            "{} pass done: {} finished, {} empty, {} unparseable, {} failed",
            level,
            report.finished,
            report.empty,
            report.parse_failed,
            report.transport_failed
        );
        Ok(report)
    }

    /// Applies an outcome to the node, writing its children if any
    fn apply(
        &mut self,
        node: &mut Entity,
        outcome: NodeOutcome,
        report: &mut LevelReport,
    ) -> Result<FailureVerdict> {
        match outcome {
            NodeOutcome::Children(items) => {
                let parent: &Entity = node;
                let children: Vec<Entity> = items
                    .into_iter()
                    .filter_map(|item| Entity::child_of(parent, item.id, item.name))
                    .collect();
                let written = self.writer.insert(&mut *self.store, &children)?;

                node.finish(children.len() as u32);
                self.governor.record_success();
                report.finished += 1;
                report.children_inserted += written.inserted;
                report.children_existing += written.duplicates;
                tracing::info!(
                    "Saved {} children of {} ({} new)",
                    children.len(),
                    node.id,
                    written.inserted
                );
            }
            NodeOutcome::Empty => {
                node.mark(CrawlStatus::CrawledButEmpty);
                report.empty += 1;
                tracing::info!("No items on {}", node.id);
            }
            NodeOutcome::ParseFailed(e) => {
                node.mark(CrawlStatus::CrawledButEmpty);
                report.parse_failed += 1;
                tracing::warn!("Parse error: {}", e);
                return Ok(self.governor.record_parse_failure());
            }
            NodeOutcome::TransportFailed(e) => {
                node.mark(CrawlStatus::FailedToCrawl);
                report.transport_failed += 1;
                tracing::warn!("Fetch failed: {}", e);
            }
        }
        Ok(FailureVerdict::Continue)
    }
}

/// Drops repeated ids, keeping the first occurrence
pub(crate) fn distinct(items: Vec<ParsedItem>) -> Vec<ParsedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}
