//! Output module for crawl reports
//!
//! This module handles:
//! - Status statistics per level and per listing shard
//! - The summary printed after a crawl invocation

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, CrawlStatistics, LevelStatistics};

use crate::crawler::{CrawlSummary, DetailReport, WalkReport};
use std::fmt::Write;

/// Formats the counters of a finished crawl invocation
pub fn render_summary(summary: &CrawlSummary) -> String {
    match summary {
        CrawlSummary::Walk(report) => render_walk(report),
        CrawlSummary::Details(report) => render_details(report),
    }
}

fn render_walk(report: &WalkReport) -> String {
    let mut out = String::new();
    if let Some(seeded) = &report.seeded {
        let _ = writeln!(
            out,
            "Seeded {} regions ({} already known)",
            seeded.inserted, seeded.duplicates
        );
    }
    for (level, r) in &report.levels {
        let _ = writeln!(
            out,
            "{}: {} selected, {} finished, {} empty, {} unparseable, {} failed, {} new children",
            level,
            r.selected,
            r.finished,
            r.empty,
            r.parse_failed,
            r.transport_failed,
            r.children_inserted
        );
    }
    out
}

fn render_details(report: &DetailReport) -> String {
    format!(
        "details: {} selected, {} stored, {} empty, {} unparseable, {} failed\n",
        report.selected, report.finished, report.empty, report.parse_failed, report.transport_failed
    )
}
