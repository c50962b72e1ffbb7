//! In-memory destination.
//!
//! Mirrors the constraint behavior of the PostgreSQL table closely enough to
//! exercise the loader end to end: a uniqueness constraint on the natural key
//! that rejects whole batches, a required geometry column, and a monotonically
//! increasing row id. Used by `--dry-run` and by tests, which can also inject
//! failures.

use crate::copy_format::decode_payload;
use crate::destination::Destination;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: u64,
    pub natural_key: Option<String>,
    pub lat: f64,
    pub lon: f64,
    pub fields: serde_json::Value,
    /// `(lon, lat)` once computed.
    pub geom: Option<(f64, f64)>,
}

/// Table contents and schema flags.
#[derive(Debug)]
struct MemoryTable {
    rows: BTreeMap<u64, StoredRow>,
    next_id: u64,
    geometry_required: bool,
    unique_key: bool,
    indexed: bool,
}

impl Default for MemoryTable {
    /// A freshly initialized table is in its finalized shape.
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
            geometry_required: true,
            unique_key: true,
            indexed: true,
        }
    }
}

impl MemoryTable {
    fn duplicate_keys(&self) -> Option<&str> {
        let mut seen = HashSet::new();
        self.rows
            .values()
            .filter_map(|r| r.natural_key.as_deref())
            .find(|k| !seen.insert(*k))
    }
}

#[derive(Debug, Default)]
struct Faults {
    unreachable: bool,
    /// Number of further successful inserts before every insert fails.
    fail_insert_after: Option<usize>,
}

/// Shared in-memory table; clones see the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    table: Arc<Mutex<MemoryTable>>,
    faults: Arc<Mutex<Faults>>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` fail as if the store were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.lock().unreachable = unreachable;
    }

    /// Let `n` more bulk inserts succeed, then fail all later ones.
    pub fn fail_inserts_after(&self, n: usize) {
        self.faults.lock().fail_insert_after = Some(n);
    }

    /// Remove any injected insert failure.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Snapshot of all rows in id order.
    pub fn rows(&self) -> Vec<StoredRow> {
        self.table.lock().rows.values().cloned().collect()
    }

    /// Natural keys present, sorted, duplicates kept.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .table
            .lock()
            .rows
            .values()
            .filter_map(|r| r.natural_key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.table.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the table is in its finalized shape (constraint, indexes, required geometry).
    pub fn is_finalized(&self) -> bool {
        let t = self.table.lock();
        t.unique_key && t.indexed && t.geometry_required
    }

    fn check_insert_fault(&self) -> Result<()> {
        let mut faults = self.faults.lock();
        match faults.fail_insert_after.as_mut() {
            Some(0) => Err(IngestError::destination("injected bulk insert failure")),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn parse_coordinate(value: Option<&String>, name: &str) -> Result<f64> {
    value
        .and_then(|v| v.parse::<f64>().ok())
        .ok_or_else(|| IngestError::destination(format!("invalid {name} value {value:?}")))
}

#[async_trait]
impl Destination for MemoryDestination {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn ping(&mut self) -> Result<()> {
        if self.faults.lock().unreachable {
            return Err(IngestError::destination("memory destination unreachable"));
        }
        Ok(())
    }

    async fn bulk_insert(&mut self, payload: String) -> Result<u64> {
        self.check_insert_fault()?;

        let mut staged = Vec::new();
        for row in decode_payload(&payload) {
            let [key, lat, lon, fields] = <[Option<String>; 4]>::try_from(row).map_err(|row| {
                IngestError::destination(format!("expected 4 fields, got {}", row.len()))
            })?;
            let lat = parse_coordinate(lat.as_ref(), "lat")?;
            let lon = parse_coordinate(lon.as_ref(), "lon")?;
            let fields = fields
                .ok_or_else(|| IngestError::destination("null value in column fields"))?;
            staged.push((key, lat, lon, serde_json::from_str(&fields)?));
        }

        // All-or-nothing, like a single COPY statement.
        let mut table = self.table.lock();
        if table.geometry_required && !staged.is_empty() {
            return Err(IngestError::destination("null value in column geom"));
        }
        if table.unique_key {
            let mut seen: HashSet<&str> = table
                .rows
                .values()
                .filter_map(|r| r.natural_key.as_deref())
                .collect();
            for (key, ..) in &staged {
                if let Some(k) = key.as_deref() {
                    if !seen.insert(k) {
                        return Err(IngestError::destination(format!(
                            "duplicate key value violates unique constraint: {k}"
                        )));
                    }
                }
            }
        }

        let count = staged.len() as u64;
        for (natural_key, lat, lon, fields) in staged {
            let id = table.next_id;
            table.next_id += 1;
            table.rows.insert(
                id,
                StoredRow {
                    id,
                    natural_key,
                    lat,
                    lon,
                    fields,
                    geom: None,
                },
            );
        }
        Ok(count)
    }

    async fn relax_geometry_required(&mut self) -> Result<()> {
        self.table.lock().geometry_required = false;
        Ok(())
    }

    async fn drop_indexes(&mut self) -> Result<()> {
        let mut table = self.table.lock();
        table.unique_key = false;
        table.indexed = false;
        Ok(())
    }

    async fn deduplicate(&mut self) -> Result<u64> {
        let mut table = self.table.lock();
        let mut seen = HashSet::new();
        let doomed: Vec<u64> = table
            .rows
            .values()
            .filter(|r| r.natural_key.as_ref().is_some_and(|k| !seen.insert(k.clone())))
            .map(|r| r.id)
            .collect();
        for id in &doomed {
            table.rows.remove(id);
        }
        Ok(doomed.len() as u64)
    }

    async fn backfill_geometry(&mut self) -> Result<u64> {
        let mut table = self.table.lock();
        let mut updated = 0;
        for row in table.rows.values_mut().filter(|r| r.geom.is_none()) {
            row.geom = Some((row.lon, row.lat));
            updated += 1;
        }
        Ok(updated)
    }

    async fn require_geometry(&mut self) -> Result<()> {
        let mut table = self.table.lock();
        if table.rows.values().any(|r| r.geom.is_none()) {
            return Err(IngestError::destination(
                "column geom contains null values",
            ));
        }
        table.geometry_required = true;
        Ok(())
    }

    async fn create_indexes(&mut self) -> Result<()> {
        let mut table = self.table.lock();
        if !table.unique_key {
            if let Some(key) = table.duplicate_keys() {
                return Err(IngestError::destination(format!(
                    "could not create unique constraint: key {key} is duplicated"
                )));
            }
            table.unique_key = true;
        }
        table.indexed = true;
        Ok(())
    }
}
