//! Dataset configuration.
//!
//! Delimiter, key column and geocoding strategy are properties of the
//! dataset, not of the code. Both binaries flatten [`DatasetArgs`] into their
//! CLI and turn it into a [`DatasetConfig`].

use crate::error::{CoreError, Result};
use crate::geocode::{Geocoder, LambertConformalConic};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};

/// Default composite geolocation column of the SIRENE establishment export.
pub const DEFAULT_GEO_COLUMN: &str = "G\u{e9}olocalisation de l'\u{e9}tablissement";

/// Default natural key column.
pub const DEFAULT_KEY_COLUMN: &str = "SIRET";

/// Default Lambert-93 abscissa column.
pub const DEFAULT_X_COLUMN: &str = "coordonneeLambertAbscisseEtablissement";

/// Default Lambert-93 ordinate column.
pub const DEFAULT_Y_COLUMN: &str = "coordonneeLambertOrdonneeEtablissement";

/// Which geocoding strategy a dataset uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodingKind {
    /// One `"lat,lon"` text column.
    #[default]
    Composite,
    /// Two planar Lambert-93 columns.
    Planar,
}

/// Dataset options shared by the loader and server CLIs.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// Field delimiter of the source file (single byte)
    #[arg(long, env = "GEODIR_DELIMITER", default_value = ";")]
    pub delimiter: char,

    /// Column holding the natural key used for deduplication
    #[arg(long, env = "GEODIR_KEY_COLUMN", default_value = DEFAULT_KEY_COLUMN)]
    pub key_column: String,

    /// Geocoding strategy
    #[arg(long, env = "GEODIR_GEOCODING", default_value = "composite", value_enum)]
    pub geocoding: GeocodingKind,

    /// Composite "lat,lon" column (composite strategy)
    #[arg(long, env = "GEODIR_GEO_COLUMN", default_value = DEFAULT_GEO_COLUMN)]
    pub geo_column: String,

    /// Planar X column (planar strategy)
    #[arg(long, env = "GEODIR_X_COLUMN", default_value = DEFAULT_X_COLUMN)]
    pub x_column: String,

    /// Planar Y column (planar strategy)
    #[arg(long, env = "GEODIR_Y_COLUMN", default_value = DEFAULT_Y_COLUMN)]
    pub y_column: String,
}

impl Default for DatasetArgs {
    fn default() -> Self {
        Self {
            delimiter: ';',
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            geocoding: GeocodingKind::Composite,
            geo_column: DEFAULT_GEO_COLUMN.to_string(),
            x_column: DEFAULT_X_COLUMN.to_string(),
            y_column: DEFAULT_Y_COLUMN.to_string(),
        }
    }
}

impl DatasetArgs {
    /// Validate and convert into a [`DatasetConfig`].
    pub fn to_config(&self) -> Result<DatasetConfig> {
        if !self.delimiter.is_ascii() {
            return Err(CoreError::Config(format!(
                "delimiter must be a single ASCII byte, got {:?}",
                self.delimiter
            )));
        }
        let geocoder = match self.geocoding {
            GeocodingKind::Composite => Geocoder::Composite {
                column: self.geo_column.clone(),
            },
            GeocodingKind::Planar => Geocoder::Planar {
                x_column: self.x_column.clone(),
                y_column: self.y_column.clone(),
                projection: LambertConformalConic::lambert93(),
            },
        };
        Ok(DatasetConfig {
            delimiter: self.delimiter as u8,
            key_column: self.key_column.clone(),
            geocoder,
        })
    }
}

/// Resolved dataset configuration.
#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Field delimiter byte.
    pub delimiter: u8,

    /// Natural key column.
    pub key_column: String,

    /// Coordinate resolution strategy.
    pub geocoder: Geocoder,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            delimiter: b';',
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            geocoder: Geocoder::Composite {
                column: DEFAULT_GEO_COLUMN.to_string(),
            },
        }
    }
}

impl DatasetConfig {
    /// Composite-strategy config with explicit column names.
    pub fn composite(delimiter: u8, key_column: &str, geo_column: &str) -> Self {
        Self {
            delimiter,
            key_column: key_column.to_string(),
            geocoder: Geocoder::Composite {
                column: geo_column.to_string(),
            },
        }
    }

    /// Columns of the header that end up in each record's attribute bag.
    pub fn attribute_columns(&self, header: &crate::record::ColumnSet) -> crate::record::ColumnSet {
        header.without(&self.geocoder.excluded_columns())
    }

    /// Check that the header carries every column the geocoder reads.
    ///
    /// The key column is not required: a dataset without one loads fine but
    /// cannot be deduplicated.
    pub fn validate_header(&self, header: &crate::record::ColumnSet) -> Result<()> {
        for column in self.geocoder.required_columns() {
            if !header.contains(column) {
                return Err(CoreError::MissingColumn(column.to_string()));
            }
        }
        if !header.contains(&self.key_column) {
            tracing::warn!(
                key_column = %self.key_column,
                "key column not in header; natural-key deduplication will be a no-op"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ColumnSet;

    #[test]
    fn test_default_args_are_composite() {
        let cfg = DatasetArgs::default().to_config().unwrap();
        assert_eq!(cfg.delimiter, b';');
        assert!(matches!(cfg.geocoder, Geocoder::Composite { .. }));
    }

    #[test]
    fn test_non_ascii_delimiter_rejected() {
        let args = DatasetArgs {
            delimiter: '\u{e9}',
            ..Default::default()
        };
        assert!(matches!(args.to_config(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_header_requires_geo_columns() {
        let cfg = DatasetArgs {
            geocoding: GeocodingKind::Planar,
            ..Default::default()
        }
        .to_config()
        .unwrap();
        let header = ColumnSet::new(["SIRET", DEFAULT_X_COLUMN]);
        match cfg.validate_header(&header) {
            Err(CoreError::MissingColumn(c)) => assert_eq!(c, DEFAULT_Y_COLUMN),
            other => panic!("expected missing column, got {other:?}"),
        }
    }

    #[test]
    fn test_attribute_columns_drop_composite_field() {
        let cfg = DatasetConfig::composite(b';', "SIRET", "geo");
        let header = ColumnSet::new(["SIRET", "geo", "name"]);
        let attrs = cfg.attribute_columns(&header);
        assert_eq!(attrs.names(), &["SIRET".to_string(), "name".to_string()]);
    }
}
