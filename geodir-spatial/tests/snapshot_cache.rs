//! Snapshot cache behavior under concurrent first use.

use async_trait::async_trait;
use geodir_core::DatasetConfig;
use geodir_spatial::{
    CsvSnapshotSource, PolygonQueryEngine, Result, Snapshot, SnapshotCache, SnapshotSource,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Counts source reads and holds each one open long enough for callers to pile up.
struct CountingSource {
    inner: CsvSnapshotSource,
    reads: AtomicUsize,
}

#[async_trait]
impl SnapshotSource for CountingSource {
    async fn load(&self) -> Result<Snapshot> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.inner.load().await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

fn write_source(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("establishments.csv");
    std::fs::write(
        &path,
        "SIRET;name;geo\n\
         1;inside;5,5\n\
         2;corner;1,1\n\
         3;outside;15,15\n",
    )
    .unwrap();
    path
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_queries_read_source_once() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(CountingSource {
        inner: CsvSnapshotSource::new(write_source(&dir), DatasetConfig::composite(b';', "SIRET", "geo")),
        reads: AtomicUsize::new(0),
    });
    let engine = PolygonQueryEngine::new(Arc::new(SnapshotCache::new(source.clone())));
    let square = json!({"type": "Polygon", "coordinates": [[[0, 0], [0, 10], [10, 10], [10, 0], [0, 0]]]});

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let engine = engine.clone();
            let square = square.clone();
            tokio::spawn(async move { engine.query(&square, None).await.map(|r| r.matches.len()) })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), 2);
    }
    assert_eq!(source.reads.load(Ordering::SeqCst), 1);

    let first = engine.cache().peek().unwrap();
    let again = engine.cache().get().await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
}

#[tokio::test]
async fn test_invalid_request_leaves_built_snapshot_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(SnapshotCache::new(Arc::new(CsvSnapshotSource::new(
        write_source(&dir),
        DatasetConfig::composite(b';', "SIRET", "geo"),
    ))));
    let engine = PolygonQueryEngine::new(cache.clone());

    let before = cache.get().await.unwrap();
    assert!(engine
        .query(&json!({"coordinates": "not-an-array"}), None)
        .await
        .is_err());
    let after = cache.peek().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert_eq!(after.len(), 3);
}
