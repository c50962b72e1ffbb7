//! Polygon selection over an in-memory snapshot of geocoded records.
//!
//! The query service answers "which establishments lie inside this polygon"
//! without a database round trip. The full dataset is materialized once per
//! process and scanned linearly per query.
//!
//! ```text
//! GeoJSON selection ──► SelectionShape (validated MultiPolygon + bbox)
//!                                │
//!   SnapshotSource ──► SnapshotCache (build once, shared Arc<Snapshot>)
//!                                │
//!                                ▼
//!                      PolygonQueryEngine::query
//!                       bbox prefilter ─► ray-casting predicate
//!                                │
//!                                ▼
//!                      QueryResult { matches, columns, stats }
//! ```
//!
//! # Modules
//!
//! - [`geometry`]: GeoJSON parsing, point-in-polygon predicate, boundary policy
//! - [`snapshot`]: snapshot type, sources and the build-once cache
//! - [`query`]: the query engine
//! - [`error`]: error types

pub mod error;
pub mod geometry;
pub mod query;
pub mod snapshot;

pub use error::{Result, SpatialError};
pub use geometry::{parse_geojson, polygon_contains, ring_position, RingPosition, SelectionShape};
pub use query::{PolygonQueryEngine, QueryResult, QueryStats};
pub use snapshot::{CsvSnapshotSource, Snapshot, SnapshotCache, SnapshotSource};
