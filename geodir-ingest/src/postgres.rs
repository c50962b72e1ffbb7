//! PostgreSQL/PostGIS destination.
//!
//! Bulk inserts go through `COPY <table> (siret, lat, lon, fields) FROM STDIN`
//! in text format. The geometry column is derived after the load with
//! `ST_SetSRID(ST_MakePoint(lon, lat), 4326)`.

use crate::copy_format::COPY_COLUMNS;
use crate::destination::Destination;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::SinkExt;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, error, info};

/// SQL text for one target table.
#[derive(Debug, Clone)]
pub struct Statements {
    table: String,
}

impl Statements {
    /// Build statements for `table`, which must be a plain SQL identifier.
    pub fn new(table: &str) -> Result<Self> {
        let mut chars = table.chars();
        let valid = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            && table.len() <= 48;
        if !valid {
            return Err(IngestError::precondition(format!(
                "invalid table name {table:?}: expected [A-Za-z_][A-Za-z0-9_]*"
            )));
        }
        Ok(Self {
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Catalog name of the table: unquoted identifiers fold to lower case.
    pub fn relation_name(&self) -> String {
        self.table.to_ascii_lowercase()
    }

    /// Existence check bound to [`Statements::relation_name`]. Plain catalog
    /// lookup, so the parameter binds as text on every server version.
    pub fn table_exists(&self) -> &'static str {
        "SELECT EXISTS (
             SELECT 1 FROM pg_catalog.pg_class
             WHERE relname = $1 AND relkind IN ('r', 'p') AND pg_table_is_visible(oid)
         )"
    }

    pub fn unique_constraint(&self) -> String {
        format!("{}_siret_key", self.table)
    }

    fn index(&self, suffix: &str) -> String {
        format!("idx_{}_{}", self.table, suffix)
    }

    pub fn session(&self, work_mem: &str) -> String {
        format!("SET synchronous_commit = off; SET work_mem = '{work_mem}'")
    }

    pub fn create_schema(&self) -> String {
        format!(
            "CREATE EXTENSION IF NOT EXISTS postgis;
             CREATE TABLE IF NOT EXISTS {t} (
                 id BIGSERIAL PRIMARY KEY,
                 siret TEXT,
                 lat DOUBLE PRECISION NOT NULL,
                 lon DOUBLE PRECISION NOT NULL,
                 fields JSONB NOT NULL,
                 geom geometry(Point, 4326) NOT NULL
             )",
            t = self.table
        )
    }

    pub fn copy_in(&self) -> String {
        format!("COPY {} ({}) FROM STDIN", self.table, COPY_COLUMNS)
    }

    pub fn relax_geometry(&self) -> String {
        format!("ALTER TABLE {} ALTER COLUMN geom DROP NOT NULL", self.table)
    }

    pub fn drop_indexes(&self) -> String {
        format!(
            "DROP INDEX IF EXISTS {geom};
             DROP INDEX IF EXISTS {fields};
             ALTER TABLE {t} DROP CONSTRAINT IF EXISTS {unique};
             DROP INDEX IF EXISTS {siret}",
            t = self.table,
            geom = self.index("geom"),
            fields = self.index("fields"),
            unique = self.unique_constraint(),
            siret = self.index("siret"),
        )
    }

    /// Keep the lowest `id` per key; NULL keys never compare equal.
    pub fn deduplicate(&self) -> String {
        format!(
            "DELETE FROM {t} a USING {t} b WHERE a.id > b.id AND a.siret = b.siret",
            t = self.table
        )
    }

    pub fn backfill_geometry(&self) -> String {
        format!(
            "UPDATE {} SET geom = ST_SetSRID(ST_MakePoint(lon, lat), 4326) WHERE geom IS NULL",
            self.table
        )
    }

    pub fn require_geometry(&self) -> String {
        format!("ALTER TABLE {} ALTER COLUMN geom SET NOT NULL", self.table)
    }

    pub fn create_indexes(&self) -> String {
        format!(
            "DO $$
             BEGIN
                 IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = '{unique}') THEN
                     ALTER TABLE {t} ADD CONSTRAINT {unique} UNIQUE (siret);
                 END IF;
             END $$;
             CREATE INDEX IF NOT EXISTS {siret} ON {t} (siret);
             CREATE INDEX IF NOT EXISTS {geom} ON {t} USING GIST (geom);
             CREATE INDEX IF NOT EXISTS {fields} ON {t} USING GIN (fields jsonb_path_ops)",
            t = self.table,
            unique = self.unique_constraint(),
            siret = self.index("siret"),
            geom = self.index("geom"),
            fields = self.index("fields"),
        )
    }
}

fn validate_work_mem(work_mem: &str) -> Result<()> {
    let digits = work_mem.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let unit = &work_mem[digits.len()..];
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && matches!(unit, "" | "kB" | "KB" | "MB" | "GB");
    if valid {
        Ok(())
    } else {
        Err(IngestError::precondition(format!(
            "invalid work_mem {work_mem:?}: expected e.g. 256MB"
        )))
    }
}

/// PostgreSQL destination over a single client connection.
pub struct PgDestination {
    client: Client,
    statements: Statements,
    work_mem: String,
    connection: JoinHandle<()>,
}

impl PgDestination {
    /// Connect to `url` and target `table`.
    pub async fn connect(url: &str, table: &str, work_mem: &str) -> Result<Self> {
        let statements = Statements::new(table)?;
        validate_work_mem(work_mem)?;

        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| IngestError::destination(format!("connect failed: {e}")))?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "postgres connection closed with error");
            }
        });
        info!(table = %statements.table(), "database connected");

        Ok(Self {
            client,
            statements,
            work_mem: work_mem.to_string(),
            connection,
        })
    }

    async fn batch(&self, sql: &str) -> Result<()> {
        debug!(sql, "executing");
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        debug!(sql, "executing");
        Ok(self.client.execute(sql, &[]).await?)
    }
}

impl Drop for PgDestination {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

#[async_trait]
impl Destination for PgDestination {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&mut self) -> Result<()> {
        let relation = self.statements.relation_name();
        let row = self
            .client
            .query_one(self.statements.table_exists(), &[&relation])
            .await?;
        let exists: bool = row.get(0);
        if !exists {
            return Err(IngestError::precondition(format!(
                "table {} does not exist (run with --init-schema to create it)",
                self.statements.table()
            )));
        }
        Ok(())
    }

    async fn init_schema(&mut self) -> Result<()> {
        self.batch(&self.statements.create_schema()).await
    }

    async fn prepare_session(&mut self) -> Result<()> {
        self.batch(&self.statements.session(&self.work_mem)).await
    }

    async fn bulk_insert(&mut self, payload: String) -> Result<u64> {
        let sink = self
            .client
            .copy_in::<_, Bytes>(self.statements.copy_in().as_str())
            .await?;
        futures::pin_mut!(sink);
        sink.send(Bytes::from(payload)).await?;
        Ok(sink.finish().await?)
    }

    async fn relax_geometry_required(&mut self) -> Result<()> {
        self.batch(&self.statements.relax_geometry()).await
    }

    async fn drop_indexes(&mut self) -> Result<()> {
        self.batch(&self.statements.drop_indexes()).await
    }

    async fn deduplicate(&mut self) -> Result<u64> {
        self.execute(&self.statements.deduplicate()).await
    }

    async fn backfill_geometry(&mut self) -> Result<u64> {
        self.execute(&self.statements.backfill_geometry()).await
    }

    async fn require_geometry(&mut self) -> Result<()> {
        self.batch(&self.statements.require_geometry()).await
    }

    async fn create_indexes(&mut self) -> Result<()> {
        self.batch(&self.statements.create_indexes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsafe_table_names() {
        assert!(Statements::new("establishments").is_ok());
        assert!(Statements::new("_t2").is_ok());
        for bad in ["", "1abc", "a-b", "a; DROP TABLE x", "sch.tbl"] {
            assert!(Statements::new(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_statement_names() {
        let s = Statements::new("establishments").unwrap();
        assert_eq!(
            s.copy_in(),
            "COPY establishments (siret, lat, lon, fields) FROM STDIN"
        );
        assert!(s.drop_indexes().contains("DROP CONSTRAINT IF EXISTS establishments_siret_key"));
        assert!(s.create_indexes().contains("idx_establishments_geom ON establishments USING GIST"));
        assert!(s.deduplicate().contains("a.id > b.id"));
    }

    #[test]
    fn test_table_exists_binds_plain_text() {
        let s = Statements::new("Establishments").unwrap();
        assert_eq!(s.relation_name(), "establishments");
        let sql = s.table_exists();
        assert!(sql.contains("pg_catalog.pg_class"));
        assert!(sql.contains("relname = $1"));
        assert!(!sql.contains("to_regclass"));
    }

    #[test]
    fn test_work_mem_validation() {
        assert!(validate_work_mem("256MB").is_ok());
        assert!(validate_work_mem("65536").is_ok());
        assert!(validate_work_mem("256MB'; --").is_err());
        assert!(validate_work_mem("MB").is_err());
    }
}
