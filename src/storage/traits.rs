//! Storage traits and error types
//!
//! This module defines the trait interfaces for storage backends and
//! associated error types.

use crate::state::{CrawlStatus, Entity, Level, ScopeFilter};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// A record with this key already exists
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Listing {0} has no region key to pick a shard")]
    MissingRegion(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Returns true if the error is a unique-key conflict and nothing else
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Destination of bulk writes
///
/// `insert_batch` must be all-or-nothing: a duplicate anywhere in the batch
/// rejects the whole batch with `StorageError::DuplicateKey` and writes nothing.
pub trait BatchSink<R> {
    /// Inserts every record or none of them
    fn insert_batch(&mut self, records: &[R]) -> StorageResult<()>;

    /// Inserts a single record
    fn insert_one(&mut self, record: &R) -> StorageResult<()>;
}

/// Persistence of hierarchy nodes and their crawl status
pub trait EntityStore {
    /// Returns every node at `level` whose status is not finished and which
    /// satisfies `filter`. Order is unspecified.
    fn select_incomplete(&self, level: Level, filter: &ScopeFilter) -> StorageResult<Vec<Entity>>;

    /// Returns every listing whose detail status is not finished
    fn select_incomplete_details(&self, filter: &ScopeFilter) -> StorageResult<Vec<Entity>>;

    /// Upserts a node by id; mutable fields are last-write-wins
    fn save(&mut self, entity: &Entity) -> StorageResult<()>;

    /// Looks up a node by id
    fn get(&self, level: Level, id: &str) -> StorageResult<Option<Entity>>;

    // ===== Statistics =====

    /// Counts nodes at `level`
    fn count(&self, level: Level) -> StorageResult<u64> {
        self.count_matching(level, &ScopeFilter::all())
    }

    /// Counts nodes at `level` that satisfy `filter`, whatever their status
    fn count_matching(&self, level: Level, filter: &ScopeFilter) -> StorageResult<u64>;

    /// Counts nodes at `level` grouped by status
    fn count_by_status(&self, level: Level) -> StorageResult<HashMap<CrawlStatus, u64>>;

    /// Returns `(region key, listing count)` for every listing shard
    fn listing_shard_counts(&self) -> StorageResult<Vec<(String, u64)>>;
}
