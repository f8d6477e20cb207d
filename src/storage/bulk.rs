//! Conflict-tolerant bulk insertion
//!
//! Most batches produced by a crawl are entirely new, so the writer first
//! tries the whole batch in one round trip. When the destination rejects the
//! batch because of a duplicate key, the batch is split into `⌈√n⌉`-sized
//! chunks and each chunk is retried the same way. Chunks smaller than
//! `minimal_size²` are inserted record by record, dropping duplicates.
//!
//! Any error other than a duplicate key aborts the insert and is returned.

use crate::storage::traits::{BatchSink, StorageResult};

/// Default chunking threshold; batches of at least 5² records are bisected
pub const DEFAULT_MINIMAL_SIZE: usize = 5;

/// Outcome of a bulk insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    /// Records newly written
    pub inserted: usize,

    /// Records skipped because their key already existed
    pub duplicates: usize,

    /// Insert calls issued against the sink (batch or single)
    pub round_trips: usize,
}

/// Bulk writer that tolerates records already present in the destination
#[derive(Debug, Clone, Copy)]
pub struct BulkWriter {
    minimal_size: usize,
}

impl Default for BulkWriter {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMAL_SIZE)
    }
}

impl BulkWriter {
    /// Creates a writer; batches of at least `minimal_size²` records are chunked
    pub fn new(minimal_size: usize) -> Self {
        Self {
            minimal_size: minimal_size.max(2),
        }
    }

    /// Smallest batch length that is split instead of inserted one by one
    pub fn bisect_threshold(&self) -> usize {
        self.minimal_size * self.minimal_size
    }

    /// Inserts `records`, silently skipping those whose key already exists
    ///
    /// Records of a batch that was accepted are never attempted again; only
    /// the members of a rejected batch are re-split.
    pub fn insert<R, S>(&self, sink: &mut S, records: &[R]) -> StorageResult<InsertReport>
    where
        S: BatchSink<R>,
    {
        let mut report = InsertReport::default();
        // Worklist of pending slices; popped last-in-first-out so chunks
        // are attempted in their original order.
        let mut pending: Vec<&[R]> = vec![records];

        while let Some(batch) = pending.pop() {
            if batch.is_empty() {
                continue;
            }

            report.round_trips += 1;
            match sink.insert_batch(batch) {
                Ok(()) => report.inserted += batch.len(),
                Err(e) if e.is_duplicate() => {
                    if batch.len() >= self.bisect_threshold() {
                        let size = chunk_size(batch.len());
                        tracing::debug!(
                            "Duplicate in batch of {}, retrying as chunks of {}",
                            batch.len(),
                            size
                        );
                        pending.extend(batch.chunks(size).rev());
                    } else {
                        self.insert_each(sink, batch, &mut report)?;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    fn insert_each<R, S>(
        &self,
        sink: &mut S,
        batch: &[R],
        report: &mut InsertReport,
    ) -> StorageResult<()>
    where
        S: BatchSink<R>,
    {
        for record in batch {
            report.round_trips += 1;
            match sink.insert_one(record) {
                Ok(()) => report.inserted += 1,
                Err(e) if e.is_duplicate() => report.duplicates += 1,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Ceiling of the square root of `n`
fn chunk_size(n: usize) -> usize {
    let mut root = (n as f64).sqrt() as usize;
    while root * root < n {
        root += 1;
    }
    while root > 1 && (root - 1) * (root - 1) >= n {
        root -= 1;
    }
    root.max(1)
}
