//! Bounded batch buffer in front of the destination.
//!
//! A flush serializes the buffer, submits it as one bulk insert, waits for the
//! store to accept it, and only then persists the checkpoint. A failed flush
//! propagates the error and leaves both the checkpoint and the buffer as they
//! were.

use crate::checkpoint::CheckpointStore;
use crate::copy_format::encode_batch;
use crate::destination::Destination;
use crate::error::Result;
use geodir_core::GeoRecord;
use std::time::{Duration, Instant};
use tracing::info;

/// Default number of records per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Outcome of one successful flush.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushReport {
    pub rows: u64,
    /// Checkpoint persisted by this flush.
    pub offset: u64,
    pub elapsed: Duration,
}

impl FlushReport {
    pub fn rows_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows as f64 / secs
        } else {
            self.rows as f64
        }
    }
}

/// Accumulates records and flushes them in fixed-size batches.
pub struct Batcher<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
    checkpoint: &'a CheckpointStore,
    batch_size: usize,
    buffer: Vec<GeoRecord>,
    /// End offset of the last source record accounted for by the buffer.
    pending_offset: Option<u64>,
    total_rows: u64,
    flushes: u64,
    started: Instant,
}

impl<'a, D: Destination + ?Sized> Batcher<'a, D> {
    /// `batch_size` is clamped to at least 1.
    pub fn new(destination: &'a mut D, checkpoint: &'a CheckpointStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            destination,
            checkpoint,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            pending_offset: None,
            total_rows: 0,
            flushes: 0,
            started: Instant::now(),
        }
    }

    /// Buffer `record`, read from the source up to `end_offset`. Flushes when full.
    pub async fn add(&mut self, record: GeoRecord, end_offset: u64) -> Result<Option<FlushReport>> {
        self.buffer.push(record);
        self.pending_offset = Some(end_offset);
        if self.buffer.len() >= self.batch_size {
            self.flush().await
        } else {
            Ok(None)
        }
    }

    /// Account for a source record that was dropped (unresolvable geocode).
    ///
    /// The offset rides along with the next flush so a resumed run does not
    /// re-read it. It never causes a flush on its own.
    pub fn skip(&mut self, end_offset: u64) {
        if !self.buffer.is_empty() {
            self.pending_offset = Some(end_offset);
        }
    }

    /// Flush whatever is buffered. `Ok(None)` when the buffer is empty.
    pub async fn flush(&mut self) -> Result<Option<FlushReport>> {
        let Some(offset) = self.pending_offset.filter(|_| !self.buffer.is_empty()) else {
            return Ok(None);
        };

        let start = Instant::now();
        let payload = encode_batch(&self.buffer)?;
        let rows = self.destination.bulk_insert(payload).await?;
        self.checkpoint.write(offset)?;

        self.buffer.clear();
        self.pending_offset = None;
        self.total_rows += rows;
        self.flushes += 1;

        let report = FlushReport {
            rows,
            offset,
            elapsed: start.elapsed(),
        };
        let total_secs = self.started.elapsed().as_secs_f64();
        info!(
            batch = self.flushes,
            rows,
            offset,
            total_rows = self.total_rows,
            "{} rows | {:.0} rows/s (batch {:.0} rows/s)",
            self.total_rows,
            if total_secs > 0.0 { self.total_rows as f64 / total_secs } else { 0.0 },
            report.rows_per_sec(),
        );
        Ok(Some(report))
    }

    /// Rows accepted by the destination so far.
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDestination;
    use geodir_core::RawRecord;

    fn record(key: &str) -> GeoRecord {
        let raw = RawRecord::from_pairs([("SIRET", key)]);
        GeoRecord::from_raw(&raw, 48.0, 2.0, "SIRET", &[])
    }

    async fn loading_destination() -> MemoryDestination {
        let mut dest = MemoryDestination::new();
        dest.relax_geometry_required().await.unwrap();
        dest.drop_indexes().await.unwrap();
        dest
    }

    #[tokio::test]
    async fn test_flushes_at_batch_size_and_checkpoints() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointStore::new(dir.path().join("cp"));
        let mut dest = loading_destination().await;
        let mut batcher = Batcher::new(&mut dest, &checkpoint, 2);

        assert!(batcher.add(record("1"), 10).await.unwrap().is_none());
        assert_eq!(checkpoint.read(), 0);
        let report = batcher.add(record("2"), 20).await.unwrap().unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.offset, 20);
        assert_eq!(checkpoint.read(), 20);

        batcher.add(record("3"), 30).await.unwrap();
        batcher.skip(35);
        let report = batcher.flush().await.unwrap().unwrap();
        assert_eq!(report.offset, 35);
        assert_eq!(batcher.total_rows(), 3);
        assert!(batcher.flush().await.unwrap().is_none());
        assert_eq!(dest.keys(), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_checkpoint_and_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = CheckpointStore::new(dir.path().join("cp"));
        let mut dest = loading_destination().await;
        dest.fail_inserts_after(1);
        let probe = dest.clone();
        let mut batcher = Batcher::new(&mut dest, &checkpoint, 1);

        batcher.add(record("1"), 10).await.unwrap();
        assert!(batcher.add(record("2"), 20).await.is_err());
        assert_eq!(checkpoint.read(), 10);
        assert_eq!(batcher.buffered(), 1);

        probe.clear_faults();
        batcher.flush().await.unwrap();
        assert_eq!(checkpoint.read(), 20);
    }
}
