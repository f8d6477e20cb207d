//! State module for the crawl hierarchy
//!
//! # Components
//!
//! - `Level`: the five ranks of the hierarchy (region down to listing)
//! - `CrawlStatus`: per-node crawl status (todo, failed, empty, finished)
//! - `Entity`: one node, with its denormalized ancestor keys
//! - `ScopeFilter`: equality filter used to shard a crawl (e.g. one region)

mod entity;
mod level;
mod status;

pub use entity::{derive_key, Entity, ParentRefs, ScopeFilter};
pub use level::Level;
pub use status::CrawlStatus;
