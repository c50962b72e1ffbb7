//! Polygon selection over the snapshot.
//!
//! A query is a linear scan: bounding-box prefilter, then the exact
//! point-in-polygon predicate from [`crate::geometry`]. The scan runs on the
//! blocking pool so a large snapshot does not stall the async workers.

use crate::error::{Result, SpatialError};
use crate::geometry::SelectionShape;
use crate::snapshot::{Snapshot, SnapshotCache};
use geodir_core::{ColumnSet, GeoRecord};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Counters from one query.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryStats {
    /// Records in the snapshot.
    pub scanned: usize,
    /// Records inside the selection's bounding box.
    pub passed_bbox: usize,
    pub result_count: usize,
    pub elapsed: Duration,
}

impl QueryStats {
    /// result_count / scanned. Lower means a more selective polygon.
    pub fn selectivity(&self) -> f64 {
        if self.scanned == 0 {
            0.0
        } else {
            self.result_count as f64 / self.scanned as f64
        }
    }

    /// result_count / passed_bbox. How tightly the box fits the polygon.
    pub fn exact_check_efficiency(&self) -> f64 {
        if self.passed_bbox == 0 {
            0.0
        } else {
            self.result_count as f64 / self.passed_bbox as f64
        }
    }
}

/// Matching records and the column list they are shaped by.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub matches: Vec<GeoRecord>,
    /// `None` only for an empty selection made before the snapshot was built.
    pub columns: Option<ColumnSet>,
    pub stats: QueryStats,
}

/// Evaluates selections against the shared snapshot.
#[derive(Clone)]
pub struct PolygonQueryEngine {
    cache: Arc<SnapshotCache>,
}

impl PolygonQueryEngine {
    pub fn new(cache: Arc<SnapshotCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    /// Select the records inside `geometry` (GeoJSON).
    ///
    /// A null geometry or empty coordinates select nothing and never build
    /// the snapshot; columns are returned only if it is already built.
    /// `projection` restricts the attribute bag and the returned columns;
    /// unknown names are rejected. Input is validated before the snapshot is
    /// touched.
    pub async fn query(&self, geometry: &Value, projection: Option<&[String]>) -> Result<QueryResult> {
        let Some(shape) = SelectionShape::from_geojson(geometry)? else {
            let columns = match self.cache.peek() {
                Some(snapshot) => Some(resolve_columns(&snapshot, projection)?),
                None => None,
            };
            return Ok(QueryResult {
                matches: Vec::new(),
                columns,
                stats: QueryStats::default(),
            });
        };

        let snapshot = self.cache.get().await?;
        let columns = resolve_columns(&snapshot, projection)?;
        let projected = projection.is_some().then(|| columns.clone());

        let (matches, stats) = tokio::task::spawn_blocking(move || {
            scan(&snapshot, &shape, projected.as_ref())
        })
        .await
        .map_err(|e| SpatialError::Internal(format!("query task failed: {e}")))?;

        debug!(
            scanned = stats.scanned,
            passed_bbox = stats.passed_bbox,
            matches = stats.result_count,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "polygon query"
        );
        Ok(QueryResult {
            matches,
            columns: Some(columns),
            stats,
        })
    }
}

fn resolve_columns(snapshot: &Snapshot, projection: Option<&[String]>) -> Result<ColumnSet> {
    match projection {
        Some(requested) => snapshot
            .columns
            .project(requested)
            .map_err(SpatialError::UnknownColumn),
        None => Ok(snapshot.columns.clone()),
    }
}

/// Linear scan of `snapshot` for records inside `shape`.
pub fn scan(
    snapshot: &Snapshot,
    shape: &SelectionShape,
    projection: Option<&ColumnSet>,
) -> (Vec<GeoRecord>, QueryStats) {
    let start = Instant::now();
    let mut stats = QueryStats {
        scanned: snapshot.len(),
        ..QueryStats::default()
    };
    let mut matches = Vec::new();

    for record in &snapshot.records {
        if !shape.bbox_may_contain(record.longitude, record.latitude) {
            continue;
        }
        stats.passed_bbox += 1;
        if shape.contains(record.longitude, record.latitude) {
            matches.push(match projection {
                Some(columns) => record.project(columns),
                None => record.clone(),
            });
        }
    }

    stats.result_count = matches.len();
    stats.elapsed = start.elapsed();
    (matches, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotSource;
    use async_trait::async_trait;
    use geodir_core::RawRecord;
    use serde_json::json;

    struct Fixed(Snapshot);

    #[async_trait]
    impl SnapshotSource for Fixed {
        async fn load(&self) -> Result<Snapshot> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    fn record(key: &str, lat: f64, lon: f64) -> GeoRecord {
        let raw = RawRecord::from_pairs([("SIRET", key), ("name", "n"), ("city", "c")]);
        GeoRecord::from_raw(&raw, lat, lon, "SIRET", &[])
    }

    fn engine() -> PolygonQueryEngine {
        let snapshot = Snapshot {
            records: vec![record("a", 5.0, 5.0), record("b", 1.0, 1.0), record("c", 15.0, 15.0)],
            columns: ColumnSet::new(["SIRET", "name", "city"]),
            excluded: 0,
            malformed: 0,
        };
        PolygonQueryEngine::new(Arc::new(SnapshotCache::new(Arc::new(Fixed(snapshot)))))
    }

    fn holed_square() -> Value {
        json!({
            "type": "Polygon",
            "coordinates": [
                [[0, 0], [0, 10], [10, 10], [10, 0], [0, 0]],
                [[4, 4], [4, 6], [6, 6], [6, 4], [4, 4]]
            ]
        })
    }

    #[tokio::test]
    async fn test_query_with_hole() {
        let result = engine().query(&holed_square(), None).await.unwrap();
        let keys: Vec<_> = result.matches.iter().map(|r| r.natural_key.as_str()).collect();
        assert_eq!(keys, vec!["b"]);
        assert_eq!(result.stats.scanned, 3);
        assert_eq!(result.stats.passed_bbox, 2);
        assert_eq!(result.columns.map(|c| c.len()), Some(3));
    }

    #[tokio::test]
    async fn test_projection() {
        let fields = vec!["city".to_string()];
        let result = engine().query(&holed_square(), Some(&fields)).await.unwrap();
        assert_eq!(result.columns.unwrap().names(), &["city".to_string()]);
        assert_eq!(result.matches[0].attributes.len(), 1);

        let unknown = vec!["zip".to_string()];
        let err = engine().query(&holed_square(), Some(&unknown)).await.unwrap_err();
        assert!(matches!(err, SpatialError::UnknownColumn(ref c) if c == "zip"));
    }

    #[tokio::test]
    async fn test_null_geometry_is_empty_success() {
        let engine = engine();
        let result = engine.query(&Value::Null, None).await.unwrap();
        assert!(result.matches.is_empty());
        assert!(result.columns.is_none());
        assert!(!engine.cache().is_built());

        engine.query(&holed_square(), None).await.unwrap();
        let result = engine.query(&Value::Null, None).await.unwrap();
        assert!(result.matches.is_empty());
        assert_eq!(result.columns.map(|c| c.len()), Some(3));
    }

    #[tokio::test]
    async fn test_invalid_geometry_does_not_build_snapshot() {
        let engine = engine();
        let err = engine
            .query(&json!({"coordinates": "not-an-array"}), None)
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(!engine.cache().is_built());
    }
}
