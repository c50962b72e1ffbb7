//! Resumable bulk loader for geocoded establishment datasets.
//!
//! A load streams a delimited source file through the decoder and geocoder
//! into a [`Destination`] in fixed-size batches. After each accepted batch
//! the source byte offset is persisted by the [`CheckpointStore`]; an
//! interrupted load resumes from there. Rows re-read after a resume are
//! removed by the natural-key deduplication pass that runs before indexes are
//! rebuilt.
//!
//! # Example
//!
//! ```no_run
//! use geodir_core::DatasetConfig;
//! use geodir_ingest::{Loader, LoaderConfig, MemoryDestination};
//!
//! # async fn demo() -> geodir_ingest::Result<()> {
//! let config = LoaderConfig::new("StockEtablissement.csv", DatasetConfig::default());
//! let summary = Loader::new(config, MemoryDestination::new()).run().await?;
//! println!("{} rows", summary.rows_inserted);
//! # Ok(())
//! # }
//! ```

pub mod batcher;
pub mod checkpoint;
pub mod copy_format;
pub mod destination;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod memory;
pub mod postgres;

pub use batcher::{Batcher, FlushReport, DEFAULT_BATCH_SIZE};
pub use checkpoint::CheckpointStore;
pub use destination::Destination;
pub use error::{IngestError, Result};
pub use lifecycle::{FinalizeReport, IndexLifecycle};
pub use loader::{LoadState, LoadSummary, Loader, LoaderConfig};
pub use memory::{MemoryDestination, StoredRow};
pub use postgres::{PgDestination, Statements};
