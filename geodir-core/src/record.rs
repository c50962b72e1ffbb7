//! Record and column types shared by the loader and the query service.
//!
//! # Design
//!
//! - [`ColumnSet`] is built once from the header row and shared by reference
//!   (cheap `Clone`) with every record decoded against it.
//! - [`RawRecord`] keeps the decoded row as a positional `csv::StringRecord`
//!   and resolves names through the shared column index, so decoding does not
//!   allocate a map per row.
//! - [`GeoRecord`] is the canonical geocoded unit: coordinates, natural key
//!   and the attribute bag.

use csv::StringRecord;
use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Ordered, read-only list of column names for one dataset.
#[derive(Debug, Clone)]
pub struct ColumnSet {
    names: Arc<[String]>,
    index: Arc<HashMap<String, usize>>,
}

impl ColumnSet {
    /// Build a column set. When a name repeats, lookups resolve to its first position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            names: names.into(),
            index: Arc::new(index),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of `name` in the header, if present.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// A new column set with the given names removed, order preserved.
    pub fn without(&self, excluded: &[String]) -> ColumnSet {
        ColumnSet::new(
            self.names
                .iter()
                .filter(|n| !excluded.iter().any(|e| e == *n))
                .cloned(),
        )
    }

    /// Restrict to `requested`, keeping the dataset's column order.
    ///
    /// Returns the first requested name that is not part of this set as the error.
    pub fn project(&self, requested: &[String]) -> std::result::Result<ColumnSet, String> {
        if let Some(unknown) = requested.iter().find(|r| !self.contains(r)) {
            return Err(unknown.clone());
        }
        Ok(ColumnSet::new(
            self.names
                .iter()
                .filter(|n| requested.iter().any(|r| r == *n))
                .cloned(),
        ))
    }
}

impl PartialEq for ColumnSet {
    fn eq(&self, other: &Self) -> bool {
        self.names == other.names
    }
}

impl Eq for ColumnSet {}

impl Serialize for ColumnSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.names.len()))?;
        for name in self.names.iter() {
            seq.serialize_element(name)?;
        }
        seq.end()
    }
}

/// A decoded source row, addressed by column name.
#[derive(Debug, Clone)]
pub struct RawRecord {
    columns: ColumnSet,
    values: StringRecord,
}

impl RawRecord {
    /// Pair a positional row with its column set.
    ///
    /// Callers guarantee `values.len() == columns.len()`; the decoder skips rows
    /// that do not.
    pub fn new(columns: ColumnSet, values: StringRecord) -> Self {
        Self { columns, values }
    }

    /// Build a record from `(name, value)` pairs. Mostly useful in tests.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let (names, values): (Vec<&str>, Vec<&str>) = pairs.into_iter().unzip();
        Self {
            columns: ColumnSet::new(names),
            values: StringRecord::from(values),
        }
    }

    /// Value of `column`, or `None` when the column is not in the header.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .position(column)
            .and_then(|i| self.values.get(i))
    }

    pub fn columns(&self) -> &ColumnSet {
        &self.columns
    }

    /// `(column, value)` pairs in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.columns.iter().zip(self.values.iter())
    }
}

/// A geocoded record: the unit the loader writes and the query service returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    /// Business identifier used for deduplication. Empty when the source has none.
    #[serde(rename = "key")]
    pub natural_key: String,

    #[serde(rename = "lat")]
    pub latitude: f64,

    #[serde(rename = "lon")]
    pub longitude: f64,

    /// Source fields by column name.
    #[serde(rename = "fields")]
    pub attributes: BTreeMap<String, String>,
}

impl GeoRecord {
    /// Build from a decoded row and its resolved coordinates.
    ///
    /// `key_column` supplies the natural key (empty if the column is absent);
    /// columns listed in `excluded` are left out of the attribute bag.
    pub fn from_raw(
        raw: &RawRecord,
        latitude: f64,
        longitude: f64,
        key_column: &str,
        excluded: &[String],
    ) -> Self {
        let natural_key = raw.get(key_column).unwrap_or_default().to_string();
        let attributes = raw
            .iter()
            .filter(|(name, _)| !excluded.iter().any(|e| e == name))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Self {
            natural_key,
            latitude,
            longitude,
            attributes,
        }
    }

    /// The attribute bag as a JSON object, the form stored in the bulk blob column.
    pub fn attributes_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.attributes)
    }

    /// Copy of this record keeping only the attributes named in `columns`.
    pub fn project(&self, columns: &ColumnSet) -> GeoRecord {
        GeoRecord {
            natural_key: self.natural_key.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            attributes: self
                .attributes
                .iter()
                .filter(|(k, _)| columns.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_lookup_first_wins() {
        let cols = ColumnSet::new(["a", "b", "a"]);
        assert_eq!(cols.len(), 3);
        assert_eq!(cols.position("a"), Some(0));
        assert_eq!(cols.position("b"), Some(1));
        assert_eq!(cols.position("c"), None);
    }

    #[test]
    fn test_column_projection_keeps_dataset_order() {
        let cols = ColumnSet::new(["siret", "name", "city"]);
        let projected = cols
            .project(&["city".to_string(), "siret".to_string()])
            .unwrap();
        assert_eq!(projected.names(), &["siret".to_string(), "city".to_string()]);

        let err = cols.project(&["zip".to_string()]).unwrap_err();
        assert_eq!(err, "zip");
    }

    #[test]
    fn test_geo_record_from_raw_excludes_columns() {
        let raw = RawRecord::from_pairs([
            ("SIRET", "123"),
            ("name", "Boulangerie"),
            ("geo", "48.85,2.35"),
        ]);
        let rec = GeoRecord::from_raw(&raw, 48.85, 2.35, "SIRET", &["geo".to_string()]);
        assert_eq!(rec.natural_key, "123");
        assert_eq!(rec.attributes.len(), 2);
        assert!(!rec.attributes.contains_key("geo"));
        assert_eq!(rec.attributes.get("name").map(String::as_str), Some("Boulangerie"));
    }

    #[test]
    fn test_missing_key_column_is_empty_key() {
        let raw = RawRecord::from_pairs([("name", "x")]);
        let rec = GeoRecord::from_raw(&raw, 1.0, 2.0, "SIRET", &[]);
        assert!(rec.natural_key.is_empty());
    }

    #[test]
    fn test_record_json_shape() {
        let raw = RawRecord::from_pairs([("SIRET", "1"), ("name", "n")]);
        let rec = GeoRecord::from_raw(&raw, 1.5, 2.5, "SIRET", &[]);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["key"], "1");
        assert_eq!(json["lat"], 1.5);
        assert_eq!(json["lon"], 2.5);
        assert_eq!(json["fields"]["name"], "n");

        let cols = serde_json::to_value(ColumnSet::new(["x", "y"])).unwrap();
        assert_eq!(cols, serde_json::json!(["x", "y"]));
    }
}
