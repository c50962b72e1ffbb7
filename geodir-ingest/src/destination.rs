//! Destination store abstraction.
//!
//! The loader drives the store through this trait so the same orchestration
//! runs against PostgreSQL ([`crate::PgDestination`]) or the in-memory table
//! ([`crate::MemoryDestination`]) used by dry runs and tests.
//!
//! Every schema operation must be idempotent: dropping what is already gone
//! and creating what already exists both succeed.

use crate::error::Result;
use async_trait::async_trait;

/// A bulk-load sink with index/constraint lifecycle hooks.
#[async_trait]
pub trait Destination: Send {
    /// Short name for logs ("postgres", "memory").
    fn kind(&self) -> &'static str;

    /// Verify the store is reachable and the target table exists.
    async fn ping(&mut self) -> Result<()>;

    /// Create the target table (and its extensions) if absent.
    async fn init_schema(&mut self) -> Result<()> {
        Ok(())
    }

    /// Per-session tuning applied before the bulk phase.
    async fn prepare_session(&mut self) -> Result<()> {
        Ok(())
    }

    /// Submit one serialized batch as a single bulk insert. Returns rows written.
    ///
    /// Must not return before the store has accepted (or rejected) the batch.
    async fn bulk_insert(&mut self, payload: String) -> Result<u64>;

    /// Allow the computed geometry column to be null while loading.
    async fn relax_geometry_required(&mut self) -> Result<()>;

    /// Drop the natural-key uniqueness constraint and all secondary indexes.
    async fn drop_indexes(&mut self) -> Result<()>;

    /// Delete all but the lowest-id row for each non-null natural key. Returns rows removed.
    async fn deduplicate(&mut self) -> Result<u64>;

    /// Compute the geometry from `(lon, lat)` where it is unset. Returns rows updated.
    async fn backfill_geometry(&mut self) -> Result<u64>;

    /// Make the geometry column required again.
    async fn require_geometry(&mut self) -> Result<()>;

    /// Recreate the uniqueness constraint and the key, spatial and attribute indexes.
    async fn create_indexes(&mut self) -> Result<()>;
}
