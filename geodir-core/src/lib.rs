//! Shared record model for the geodir ingestion and query pipeline.
//!
//! Both the bulk loader and the spatial query service consume the same
//! delimited source file. This crate owns everything they agree on:
//!
//! - **Records**: [`RawRecord`] (decoded row, column-addressed) and
//!   [`GeoRecord`] (geocoded row with its attribute bag)
//! - **Columns**: [`ColumnSet`], fixed once from the header row
//! - **Decoding**: [`DelimitedDecoder`], tolerant of malformed rows and
//!   reporting absolute byte offsets for checkpointing
//! - **Geocoding**: [`Geocoder`], composite `"lat,lon"` field or planar
//!   Lambert coordinates
//! - **Dataset configuration**: [`DatasetConfig`] / [`DatasetArgs`]

pub mod config;
pub mod decode;
pub mod error;
pub mod geocode;
pub mod record;

pub use config::{DatasetArgs, DatasetConfig, GeocodingKind};
pub use decode::{DecodeStats, DecodedRecord, DelimitedDecoder, Header, Records};
pub use error::{CoreError, Result};
pub use geocode::{Geocoder, LambertConformalConic, LatLon};
pub use record::{ColumnSet, GeoRecord, RawRecord};
