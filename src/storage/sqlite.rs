//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the `EntityStore`
//! and `BatchSink` traits.

use crate::state::{CrawlStatus, Entity, Level, ParentRefs, ScopeFilter};
use crate::storage::schema::{
    entity_table_sql, initialize_schema, listing_table_name, ENTITY_COLUMNS,
};
use crate::storage::traits::{BatchSink, EntityStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
    /// Listing shard tables known to exist
    shards: HashSet<String>,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // WAL lets independent crawl processes share the file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        initialize_schema(&conn)?;
        let mut store = Self {
            conn,
            shards: HashSet::new(),
        };
        store.shards = store
            .registered_shards()?
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        Ok(store)
    }

    /// Returns `(region, table)` for every registered listing shard
    fn registered_shards(&self) -> StorageResult<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT region, table_name FROM listing_shards ORDER BY region")?;
        let shards = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(shards)
    }

    /// Creates and registers the listing table for `region` if needed
    fn ensure_shard(&mut self, region: &str) -> StorageResult<String> {
        let table = listing_table_name(region);
        if self.shards.contains(&table) {
            return Ok(table);
        }

        self.conn.execute_batch(&entity_table_sql(&table))?;
        self.conn.execute(
            "INSERT OR IGNORE INTO listing_shards (region, table_name, created_at) VALUES (?1, ?2, ?3)",
            params![region, table, Utc::now().to_rfc3339()],
        )?;
        tracing::debug!("Created listing shard {} for region {}", table, region);

        self.shards.insert(table.clone());
        Ok(table)
    }

    /// Table an entity is written to; listing shards are created on demand
    fn table_for(&mut self, entity: &Entity) -> StorageResult<String> {
        match entity.level {
            Level::Listing => {
                let region = entity
                    .region_key()
                    .ok_or_else(|| StorageError::MissingRegion(entity.id.clone()))?
                    .to_string();
                self.ensure_shard(&region)
            }
            level => Ok(level.table_name().to_string()),
        }
    }

    /// Tables holding `level`, restricted to the filter's region for listings
    fn tables_for(&self, level: Level, filter: &ScopeFilter) -> StorageResult<Vec<String>> {
        if level != Level::Listing {
            return Ok(vec![level.table_name().to_string()]);
        }

        let shards = self.registered_shards()?;
        Ok(shards
            .into_iter()
            .filter(|(region, _)| filter.region_key().map_or(true, |key| key == region.as_str()))
            .map(|(_, table)| table)
            .collect())
    }

    /// Selects from every table of `level` the rows where `status_column`
    /// is not finished and the filter holds
    fn select_unfinished(
        &self,
        level: Level,
        filter: &ScopeFilter,
        status_column: &str,
    ) -> StorageResult<Vec<Entity>> {
        let (clause, values) = filter_clause(level, filter, 2)?;
        let mut entities = Vec::new();

        for table in self.tables_for(level, filter)? {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} != ?1{}",
                ENTITY_COLUMNS, table, status_column, clause
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let args = std::iter::once(CrawlStatus::Finished.to_db_string())
                .chain(values.iter().copied());
            let rows = stmt.query_map(params_from_iter(args), |row| entity_from_row(row, level))?;
            for row in rows {
                entities.push(row?);
            }
        }

        Ok(entities)
    }

    fn insert_into(conn: &Connection, table: &str, entity: &Entity) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            table, ENTITY_COLUMNS
        );
        let detail = entity.detail.as_ref().map(serde_json::to_string).transpose()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params![
            entity.id,
            entity.key,
            entity.parents.region,
            entity.parents.sub_region,
            entity.parents.postal_area,
            entity.parents.street,
            entity.name,
            entity.status.to_db_string(),
            entity.child_count,
            entity.detail_status.map(|s| s.to_db_string()),
            detail,
            now,
            now,
        ])
        .map_err(|e| classify_insert_error(e, &entity.id))?;
        Ok(())
    }
}

impl BatchSink<Entity> for SqliteStore {
    fn insert_batch(&mut self, records: &[Entity]) -> StorageResult<()> {
        let tables = records
            .iter()
            .map(|entity| self.table_for(entity))
            .collect::<StorageResult<Vec<_>>>()?;

        // Dropping the transaction on error rolls the whole batch back
        let tx = self.conn.transaction()?;
        for (entity, table) in records.iter().zip(&tables) {
            Self::insert_into(&tx, table, entity)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_one(&mut self, record: &Entity) -> StorageResult<()> {
        let table = self.table_for(record)?;
        Self::insert_into(&self.conn, &table, record)
    }
}

impl EntityStore for SqliteStore {
    fn select_incomplete(&self, level: Level, filter: &ScopeFilter) -> StorageResult<Vec<Entity>> {
        self.select_unfinished(level, filter, "status")
    }

    fn select_incomplete_details(&self, filter: &ScopeFilter) -> StorageResult<Vec<Entity>> {
        self.select_unfinished(Level::Listing, filter, "detail_status")
    }

    fn save(&mut self, entity: &Entity) -> StorageResult<()> {
        let table = self.table_for(entity)?;
        let now = Utc::now().to_rfc3339();
        let detail = entity.detail.as_ref().map(serde_json::to_string).transpose()?;
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                status = excluded.status,
                child_count = excluded.child_count,
                detail_status = excluded.detail_status,
                detail = excluded.detail,
                updated_at = excluded.updated_at",
            table = table,
            columns = ENTITY_COLUMNS
        );
        self.conn.execute(
            &sql,
            params![
                entity.id,
                entity.key,
                entity.parents.region,
                entity.parents.sub_region,
                entity.parents.postal_area,
                entity.parents.street,
                entity.name,
                entity.status.to_db_string(),
                entity.child_count,
                entity.detail_status.map(|s| s.to_db_string()),
                detail,
                now,
                now,
            ],
        )?;
        Ok(())
    }

    fn get(&self, level: Level, id: &str) -> StorageResult<Option<Entity>> {
        for table in self.tables_for(level, &ScopeFilter::all())? {
            let sql = format!("SELECT {} FROM {} WHERE id = ?1", ENTITY_COLUMNS, table);
            let found = self
                .conn
                .query_row(&sql, params![id], |row| entity_from_row(row, level))
                .optional()?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    fn count_matching(&self, level: Level, filter: &ScopeFilter) -> StorageResult<u64> {
        let (clause, values) = filter_clause(level, filter, 1)?;
        let mut total = 0u64;
        for table in self.tables_for(level, filter)? {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE TRUE{}", table, clause);
            let count: i64 = self.conn.query_row(
                &sql,
                params_from_iter(values.iter().copied()),
                |row| row.get(0),
            )?;
            total += count as u64;
        }
        Ok(total)
    }

    fn count_by_status(&self, level: Level) -> StorageResult<HashMap<CrawlStatus, u64>> {
        let mut summary = HashMap::new();

        for table in self.tables_for(level, &ScopeFilter::all())? {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT status, COUNT(*) FROM {} GROUP BY status", table))?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?;

            for row in rows {
                let (status, count) = row?;
                if let Some(status) = CrawlStatus::from_db_string(&status) {
                    *summary.entry(status).or_insert(0) += count as u64;
                }
            }
        }

        Ok(summary)
    }

    fn listing_shard_counts(&self) -> StorageResult<Vec<(String, u64)>> {
        let mut counts = Vec::new();
        for (region, table) in self.registered_shards()? {
            let count: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
            counts.push((region, count as u64));
        }
        Ok(counts)
    }
}

/// Builds the ` AND ...` suffix for a scope filter, numbering from `?first`
fn filter_clause<'a>(
    level: Level,
    filter: &'a ScopeFilter,
    first: usize,
) -> StorageResult<(String, Vec<&'a str>)> {
    let mut clause = String::new();
    let mut values = Vec::new();

    for (term_level, key) in filter.terms() {
        let column = if term_level == level {
            "key"
        } else if term_level < level {
            term_level.ref_column()
        } else {
            return Err(StorageError::InvalidFilter(format!(
                "cannot filter {} nodes by {}",
                level, term_level
            )));
        };
        values.push(key);
        clause.push_str(&format!(" AND {} = ?{}", column, first + values.len() - 1));
    }

    Ok((clause, values))
}

/// Maps a duplicate-key failure to `StorageError::DuplicateKey`
fn classify_insert_error(err: rusqlite::Error, id: &str) -> StorageError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    || e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE) =>
        {
            StorageError::DuplicateKey(id.to_string())
        }
        _ => StorageError::Sqlite(err),
    }
}

fn entity_from_row(row: &Row<'_>, level: Level) -> rusqlite::Result<Entity> {
    let detail: Option<String> = row.get(10)?;
    let detail = detail
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

    Ok(Entity {
        id: row.get(0)?,
        level,
        key: row.get(1)?,
        parents: ParentRefs {
            region: row.get(2)?,
            sub_region: row.get(3)?,
            postal_area: row.get(4)?,
            street: row.get(5)?,
        },
        name: row.get(6)?,
        // Unknown status strings fall back to Todo so the node is re-selected
        status: CrawlStatus::from_db_string(&row.get::<_, String>(7)?)
            .unwrap_or(CrawlStatus::Todo),
        child_count: row.get(8)?,
        detail_status: row
            .get::<_, Option<String>>(9)?
            .map(|s| CrawlStatus::from_db_string(&s).unwrap_or(CrawlStatus::Todo)),
        detail,
    })
}
