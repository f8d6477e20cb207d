//! Database schema definitions
//!
//! One table per parent level, keyed by the node id. Listings are sharded
//! into one table per region, created on first write and registered in
//! `listing_shards`.

use crate::state::Level;
use sha2::{Digest, Sha256};

/// Columns shared by every entity table, in insert order
pub const ENTITY_COLUMNS: &str = "id, key, region, sub_region, postal_area, street, name, status, \
     child_count, detail_status, detail, discovered_at, updated_at";

/// SQL schema for the fixed tables
pub const SCHEMA_SQL: &str = r#"
-- Registry of per-region listing tables
CREATE TABLE IF NOT EXISTS listing_shards (
    region TEXT PRIMARY KEY,
    table_name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
"#;

/// Returns the DDL for one entity table and its indexes
pub fn entity_table_sql(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id TEXT PRIMARY KEY,
    key TEXT NOT NULL,
    region TEXT,
    sub_region TEXT,
    postal_area TEXT,
    street TEXT,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    child_count INTEGER,
    detail_status TEXT,
    detail TEXT,
    discovered_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_status ON {table}(status);
CREATE INDEX IF NOT EXISTS idx_{table}_region ON {table}(region);
"#
    )
}

/// Name of the listing table for a region key
///
/// Anything outside `[a-z0-9_]` is replaced so the key is safe in SQL. A
/// digest of the raw key keeps keys that clean up alike (`new-york`,
/// `new_york`) in separate tables.
pub fn listing_table_name(region: &str) -> String {
    let suffix: String = region
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(region.as_bytes());
    format!(
        "{}_{}_{}",
        Level::Listing.table_name(),
        suffix,
        hex::encode(&digest[..4])
    )
}

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    for level in Level::parent_levels() {
        conn.execute_batch(&entity_table_sql(level.table_name()))?;
    }
    Ok(())
}
