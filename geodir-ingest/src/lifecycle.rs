//! Index and constraint lifecycle around the bulk phase.

use crate::destination::Destination;
use crate::error::Result;
use tracing::info;

/// Counters from the finalize half.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub duplicates_removed: u64,
    pub geometries_computed: u64,
}

/// Drives the destination's schema into bulk-load shape and back.
///
/// Both halves are idempotent, so a run that failed halfway through either
/// one can simply be repeated.
pub struct IndexLifecycle<'a, D: Destination + ?Sized> {
    destination: &'a mut D,
}

impl<'a, D: Destination + ?Sized> IndexLifecycle<'a, D> {
    pub fn new(destination: &'a mut D) -> Self {
        Self { destination }
    }

    /// Relax the geometry requirement and drop the constraint and indexes.
    pub async fn before(&mut self) -> Result<()> {
        self.destination.relax_geometry_required().await?;
        self.destination.drop_indexes().await?;
        info!("constraints and indexes dropped for bulk load");
        Ok(())
    }

    /// Deduplicate, backfill geometry, restore the requirement, rebuild indexes.
    pub async fn after(&mut self) -> Result<FinalizeReport> {
        let duplicates_removed = self.destination.deduplicate().await?;
        info!(duplicates_removed, "deduplicated on natural key");

        let geometries_computed = self.destination.backfill_geometry().await?;
        info!(geometries_computed, "geometry column backfilled");

        self.destination.require_geometry().await?;
        self.destination.create_indexes().await?;
        info!("constraints and indexes restored");

        Ok(FinalizeReport {
            duplicates_removed,
            geometries_computed,
        })
    }
}
