//! Load orchestration.
//!
//! ```text
//! Init ──► Prepare ──► Streaming ──► Finalize ──► Done
//!   └─────────┴────────────┴────────────┴──────► Failed
//! ```
//!
//! - **Init**: source present and header valid, destination reachable,
//!   checkpoint read.
//! - **Prepare**: session tuning, constraints and indexes dropped.
//! - **Streaming**: decode from the checkpoint, geocode, batch. Every flush
//!   makes progress durable.
//! - **Finalize**: deduplicate, backfill geometry, rebuild indexes, then
//!   clear the checkpoint.
//!
//! Any error moves to `Failed` and leaves the checkpoint in place, so
//! running the same load again resumes where the last flush ended.

use crate::batcher::{Batcher, DEFAULT_BATCH_SIZE};
use crate::checkpoint::CheckpointStore;
use crate::destination::Destination;
use crate::error::{IngestError, Result};
use crate::lifecycle::IndexLifecycle;
use geodir_core::{CoreError, DatasetConfig, DelimitedDecoder, GeoRecord, Header};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{error, info, info_span, Instrument};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Init,
    Prepare,
    Streaming,
    Finalize,
    Done,
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadState::Init => "init",
            LoadState::Prepare => "prepare",
            LoadState::Streaming => "streaming",
            LoadState::Finalize => "finalize",
            LoadState::Done => "done",
            LoadState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What to load and how.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub source: PathBuf,
    pub dataset: DatasetConfig,
    pub batch_size: usize,
    pub checkpoint_file: PathBuf,
    /// Create the destination table if absent.
    pub init_schema: bool,
}

impl LoaderConfig {
    pub fn new(source: impl Into<PathBuf>, dataset: DatasetConfig) -> Self {
        Self {
            source: source.into(),
            dataset,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_file: PathBuf::from(".import-checkpoint"),
            init_schema: false,
        }
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadSummary {
    /// Offset the run started from (0 for a fresh load).
    pub resumed_from: u64,
    pub rows_inserted: u64,
    pub batches: u64,
    pub malformed_rows: u64,
    pub unresolvable: u64,
    pub duplicates_removed: u64,
    pub geometries_computed: u64,
    pub elapsed: Duration,
}

/// Runs one load of a source file into a destination.
pub struct Loader<D: Destination> {
    config: LoaderConfig,
    destination: D,
    checkpoint: CheckpointStore,
    state: LoadState,
}

impl<D: Destination> Loader<D> {
    pub fn new(config: LoaderConfig, destination: D) -> Self {
        let checkpoint = CheckpointStore::new(config.checkpoint_file.clone());
        Self {
            config,
            destination,
            checkpoint,
            state: LoadState::Init,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn into_destination(self) -> D {
        self.destination
    }

    /// Run the load to completion or failure.
    pub async fn run(&mut self) -> Result<LoadSummary> {
        let start = Instant::now();
        match self.run_states().await {
            Ok(mut summary) => {
                summary.elapsed = start.elapsed();
                self.state = LoadState::Done;
                info!(
                    rows_inserted = summary.rows_inserted,
                    malformed_rows = summary.malformed_rows,
                    unresolvable = summary.unresolvable,
                    duplicates_removed = summary.duplicates_removed,
                    geometries_computed = summary.geometries_computed,
                    "load complete in {:.1}s",
                    summary.elapsed.as_secs_f64()
                );
                Ok(summary)
            }
            Err(e) => {
                error!(
                    state = %self.state,
                    checkpoint = self.checkpoint.read(),
                    error = %e,
                    "load failed; checkpoint kept for resume"
                );
                self.state = LoadState::Failed;
                Err(e)
            }
        }
    }

    async fn run_states(&mut self) -> Result<LoadSummary> {
        self.state = LoadState::Init;
        let (header, resumed_from) = self.init().await?;

        self.state = LoadState::Prepare;
        let kind = self.destination.kind();
        self.prepare()
            .instrument(info_span!("load_prepare", destination = kind))
            .await?;

        self.state = LoadState::Streaming;
        let mut summary = self
            .stream(&header, resumed_from)
            .instrument(info_span!("load_stream", offset = resumed_from))
            .await?;
        summary.resumed_from = resumed_from;

        self.state = LoadState::Finalize;
        let report = IndexLifecycle::new(&mut self.destination)
            .after()
            .instrument(info_span!("load_finalize"))
            .await?;
        summary.duplicates_removed = report.duplicates_removed;
        summary.geometries_computed = report.geometries_computed;
        self.checkpoint.clear()?;

        Ok(summary)
    }

    async fn init(&mut self) -> Result<(Header, u64)> {
        let source = &self.config.source;
        if !source.is_file() {
            return Err(IngestError::precondition(format!(
                "source file {} not found",
                source.display()
            )));
        }
        let decoder = DelimitedDecoder::new(self.config.dataset.delimiter);
        let header = decoder.open_header(source)?;
        self.config.dataset.validate_header(&header.columns)?;

        if self.config.init_schema {
            self.destination.init_schema().await?;
        }
        self.destination.ping().await?;

        let offset = self.checkpoint.read();
        if offset > 0 {
            info!(offset, checkpoint = %self.checkpoint.path().display(), "resuming from checkpoint");
        } else {
            info!(source = %source.display(), columns = header.columns.len(), "starting fresh load");
        }
        Ok((header, offset))
    }

    async fn prepare(&mut self) -> Result<()> {
        self.destination.prepare_session().await?;
        IndexLifecycle::new(&mut self.destination).before().await
    }

    async fn stream(&mut self, header: &Header, offset: u64) -> Result<LoadSummary> {
        let dataset = &self.config.dataset;
        let excluded = dataset.geocoder.excluded_columns();
        let decoder = DelimitedDecoder::new(dataset.delimiter);
        let records = decoder.open_at(&self.config.source, header, offset)?;

        // File reads and parsing run on the blocking pool; rows arrive in order.
        let (tx, mut rx) = mpsc::channel(self.config.batch_size.max(1));
        let reader = tokio::task::spawn_blocking(move || {
            let mut records = records;
            for decoded in records.by_ref() {
                let failed = decoded.is_err();
                if tx.blocking_send(decoded).is_err() || failed {
                    break;
                }
            }
            records.stats()
        });

        let mut batcher = Batcher::new(&mut self.destination, &self.checkpoint, self.config.batch_size);
        let mut unresolvable = 0u64;

        while let Some(decoded) = rx.recv().await {
            let decoded = decoded?;
            let Some(at) = dataset.geocoder.resolve(&decoded.record) else {
                unresolvable += 1;
                batcher.skip(decoded.end_offset);
                continue;
            };
            let record = GeoRecord::from_raw(
                &decoded.record,
                at.lat,
                at.lon,
                &dataset.key_column,
                &excluded,
            );
            batcher.add(record, decoded.end_offset).await?;
        }
        batcher.flush().await?;

        let stats = reader
            .await
            .map_err(|e| IngestError::Source(CoreError::Io(std::io::Error::other(e))))?;
        if stats.malformed > 0 || unresolvable > 0 {
            info!(
                malformed = stats.malformed,
                unresolvable,
                "rows skipped during streaming"
            );
        }
        Ok(LoadSummary {
            rows_inserted: batcher.total_rows(),
            batches: batcher.flushes(),
            malformed_rows: stats.malformed,
            unresolvable,
            ..LoadSummary::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDestination;

    #[tokio::test]
    async fn test_missing_source_fails_in_init() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LoaderConfig::new(dir.path().join("absent.csv"), DatasetConfig::default());
        config.checkpoint_file = dir.path().join("cp");
        let mut loader = Loader::new(config, MemoryDestination::new());

        let err = loader.run().await.unwrap_err();
        assert!(matches!(err, IngestError::Precondition(_)));
        assert_eq!(loader.state(), LoadState::Failed);
        assert!(loader.destination().is_finalized());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LoadState::Streaming.to_string(), "streaming");
    }
}
