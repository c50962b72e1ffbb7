//! Process-lifetime snapshot of the geocoded dataset.
//!
//! The snapshot is built on first use and never invalidated; restarting the
//! process is the only refresh. Concurrent first callers share a single
//! build: one runs it, the rest wait and receive the same `Arc`. A failed
//! build leaves the cache empty, so a later call retries from scratch and no
//! caller ever observes a partial snapshot.

use crate::error::{Result, SpatialError};
use async_trait::async_trait;
use geodir_core::{ColumnSet, DatasetConfig, DelimitedDecoder, GeoRecord};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tracing::{info, warn};

/// Immutable materialization of the dataset.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub records: Vec<GeoRecord>,
    /// Attribute columns, in source order.
    pub columns: ColumnSet,
    /// Rows dropped because their coordinates could not be resolved.
    pub excluded: u64,
    /// Rows dropped as malformed by the decoder.
    pub malformed: u64,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Where a snapshot is built from.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;

    /// Human-readable origin for logs.
    fn describe(&self) -> String;
}

/// Reads the delimited source file the loader consumes.
#[derive(Debug, Clone)]
pub struct CsvSnapshotSource {
    path: PathBuf,
    dataset: DatasetConfig,
}

impl CsvSnapshotSource {
    pub fn new(path: impl Into<PathBuf>, dataset: DatasetConfig) -> Self {
        Self {
            path: path.into(),
            dataset,
        }
    }

    /// Decode and geocode the whole file. Blocking.
    pub fn read(&self) -> Result<Snapshot> {
        let decoder = DelimitedDecoder::new(self.dataset.delimiter);
        let header = decoder.open_header(&self.path)?;
        self.dataset.validate_header(&header.columns)?;

        let columns = self.dataset.attribute_columns(&header.columns);
        let excluded_columns = self.dataset.geocoder.excluded_columns();
        let mut rows = decoder.open_at(&self.path, &header, 0)?;
        let mut records = Vec::new();
        let mut excluded = 0u64;

        for decoded in rows.by_ref() {
            let decoded = decoded?;
            match self.dataset.geocoder.resolve(&decoded.record) {
                Some(at) => records.push(GeoRecord::from_raw(
                    &decoded.record,
                    at.lat,
                    at.lon,
                    &self.dataset.key_column,
                    &excluded_columns,
                )),
                None => excluded += 1,
            }
        }

        records.shrink_to_fit();
        Ok(Snapshot {
            records,
            columns,
            excluded,
            malformed: rows.stats().malformed,
        })
    }
}

#[async_trait]
impl SnapshotSource for CsvSnapshotSource {
    async fn load(&self) -> Result<Snapshot> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.read())
            .await
            .map_err(|e| SpatialError::Internal(format!("snapshot build task failed: {e}")))?
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Build-once holder for the process snapshot.
pub struct SnapshotCache {
    source: Arc<dyn SnapshotSource>,
    cell: OnceCell<Arc<Snapshot>>,
}

impl SnapshotCache {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// The snapshot, building it if this is the first call.
    pub async fn get(&self) -> Result<Arc<Snapshot>> {
        self.cell
            .get_or_try_init(|| async {
                let start = Instant::now();
                let origin = self.source.describe();
                info!(source = %origin, "building snapshot");
                match self.source.load().await {
                    Ok(snapshot) => {
                        log_built(&snapshot, start.elapsed());
                        Ok(Arc::new(snapshot))
                    }
                    Err(e) => {
                        warn!(source = %origin, error = %e, "snapshot build failed");
                        Err(e)
                    }
                }
            })
            .await
            .cloned()
    }

    /// The snapshot if it has already been built.
    pub fn peek(&self) -> Option<Arc<Snapshot>> {
        self.cell.get().cloned()
    }

    pub fn is_built(&self) -> bool {
        self.cell.initialized()
    }
}

fn log_built(snapshot: &Snapshot, elapsed: Duration) {
    info!(
        records = snapshot.len(),
        columns = snapshot.columns.len(),
        excluded = snapshot.excluded,
        malformed = snapshot.malformed,
        "snapshot built in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use geodir_core::CoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SnapshotSource for FlakySource {
        async fn load(&self) -> Result<Snapshot> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(SpatialError::Snapshot(CoreError::EmptySource));
            }
            Ok(Snapshot {
                records: Vec::new(),
                columns: ColumnSet::new(["a"]),
                excluded: 0,
                malformed: 0,
            })
        }

        fn describe(&self) -> String {
            "flaky".into()
        }
    }

    #[tokio::test]
    async fn test_failed_build_is_retried() {
        let source = Arc::new(FlakySource {
            calls: AtomicUsize::new(0),
        });
        let cache = SnapshotCache::new(source.clone());

        assert!(cache.get().await.is_err());
        assert!(!cache.is_built());
        assert!(cache.peek().is_none());

        let snapshot = cache.get().await.unwrap();
        assert_eq!(snapshot.columns.names(), &["a".to_string()]);
        assert!(cache.is_built());
        cache.get().await.unwrap();
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_csv_source_excludes_unresolvable_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "SIRET;name;geo\n1;a;48.1,2.1\n2;b;\n3;c\n4;d;48.4,2.4\n").unwrap();

        let source = CsvSnapshotSource::new(&path, DatasetConfig::composite(b';', "SIRET", "geo"));
        let snapshot = source.read().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.excluded, 1);
        assert_eq!(snapshot.malformed, 1);
        assert_eq!(snapshot.columns.names(), &["SIRET".to_string(), "name".to_string()]);
        assert_eq!(snapshot.records[1].natural_key, "4");
        assert_eq!(snapshot.records[1].longitude, 2.4);
    }

    #[test]
    fn test_csv_source_missing_file() {
        let source = CsvSnapshotSource::new("/nonexistent/data.csv", DatasetConfig::default());
        assert!(matches!(source.read(), Err(SpatialError::Snapshot(_))));
    }
}
