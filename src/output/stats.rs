//! Statistics generation from the crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl progress from the storage layer: node counts per level and status,
//! and the size of every listing shard.

use crate::state::{CrawlStatus, Level};
use crate::storage::{EntityStore, StorageResult};
use std::collections::HashMap;
use std::fmt::Write;

/// Node counts of one level
#[derive(Debug, Clone)]
pub struct LevelStatistics {
    pub level: Level,

    /// Total number of nodes discovered
    pub total: u64,

    /// Count of nodes by status
    pub by_status: HashMap<CrawlStatus, u64>,
}

impl LevelStatistics {
    pub fn count(&self, status: CrawlStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Nodes a re-run would select
    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.count(CrawlStatus::Finished))
    }

    /// Nodes whose last attempt failed or found nothing
    pub fn failures(&self) -> u64 {
        self.by_status
            .iter()
            .filter(|(status, _)| status.is_failure())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// One entry per level, shallowest first
    pub levels: Vec<LevelStatistics>,

    /// `(region key, listing count)` per listing shard
    pub listing_shards: Vec<(String, u64)>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &dyn EntityStore) -> StorageResult<CrawlStatistics> {
    let mut levels = Vec::new();
    for level in Level::all() {
        levels.push(LevelStatistics {
            level,
            total: store.count(level)?,
            by_status: store.count_by_status(level)?,
        });
    }

    Ok(CrawlStatistics {
        levels,
        listing_shards: store.listing_shard_counts()?,
    })
}

/// Formats statistics as a text report
pub fn render_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Crawl Statistics ===\n");

    let _ = write!(out, "{:<12} {:>9}", "level", "total");
    for status in CrawlStatus::all_statuses() {
        let _ = write!(out, " {:>17}", status.to_db_string());
    }
    let _ = writeln!(out);

    for level in &stats.levels {
        let _ = write!(out, "{:<12} {:>9}", level.level.as_str(), level.total);
        for status in CrawlStatus::all_statuses() {
            let _ = write!(out, " {:>17}", level.count(status));
        }
        let _ = writeln!(out);
    }

    if !stats.listing_shards.is_empty() {
        let _ = writeln!(out, "\nListings by region ({} shards):", stats.listing_shards.len());
        for (region, count) in &stats.listing_shards {
            let _ = writeln!(out, "  {}: {}", region, count);
        }
    }

    let remaining: u64 = stats
        .levels
        .iter()
        .filter(|l| l.level != Level::Listing)
        .map(LevelStatistics::remaining)
        .sum();
    let failures: u64 = stats.levels.iter().map(LevelStatistics::failures).sum();
    let _ = writeln!(out, "\nNodes left to crawl: {} ({} after a failed attempt)", remaining, failures);
    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", render_statistics(stats));
}
