//! Storage module for persisting the crawl hierarchy
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Per-level node tables and per-region listing shards
//! - Status upserts and incomplete-node selection for resumption
//! - Conflict-tolerant bulk insertion of newly discovered nodes

mod bulk;
mod schema;
mod sqlite;
mod traits;

pub use bulk::{BulkWriter, InsertReport, DEFAULT_MINIMAL_SIZE};
pub use schema::listing_table_name;
pub use sqlite::SqliteStore;
pub use traits::{BatchSink, EntityStore, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}
