//! SQLite-backed tile store.
//!
//! Geometries are persisted as little-endian ISO WKB blobs alongside an
//! `srid` column, mirroring how GeoPackage keeps the spatial reference next to
//! the binary value. The database runs in WAL mode so readers keep seeing the
//! last committed snapshot while a bulk replace is in flight.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::Feature;
use crate::geometry::{SRID_WGS84, decode_wkb, encode_wkb};

use super::{StoreError, TileStore};

/// Name of the table holding ingested tiles.
pub const DEFAULT_TABLE: &str = "karnataka_tiles";

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS karnataka_tiles (
    id INTEGER PRIMARY KEY,
    geometry BLOB NOT NULL,
    srid INTEGER NOT NULL DEFAULT 4326
)";
const CLEAR_TABLE: &str = "DELETE FROM karnataka_tiles";
const INSERT_ROW: &str = "INSERT INTO karnataka_tiles (id, geometry, srid) VALUES (?1, ?2, ?3)";
const INSERT_RETURNING: &str = "INSERT INTO karnataka_tiles (id, geometry, srid) VALUES (?1, ?2, ?3)
    RETURNING id, geometry, srid";
const UPDATE_RETURNING: &str = "UPDATE karnataka_tiles SET geometry = ?2, srid = ?3 WHERE id = ?1
    RETURNING id, geometry, srid";
const DELETE_RETURNING: &str = "DELETE FROM karnataka_tiles WHERE id = ?1 RETURNING id";
const SELECT_ONE: &str = "SELECT id, geometry, srid FROM karnataka_tiles WHERE id = ?1";
const SELECT_ALL: &str = "SELECT id, geometry, srid FROM karnataka_tiles ORDER BY id";

/// Row as stored on disk, before the geometry is decoded.
struct RawRow {
    id: i64,
    geometry: Vec<u8>,
    srid: i64,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            geometry: row.get(1)?,
            srid: row.get(2)?,
        })
    }

    fn decode(self) -> Result<Feature, StoreError> {
        if self.srid != i64::from(SRID_WGS84) {
            debug!(
                "Tagging tile {} stored with SRID {} as SRID {SRID_WGS84}",
                self.id, self.srid
            );
        }
        let geometry = decode_wkb(&self.geometry).map_err(|source| StoreError::Decode {
            id: self.id,
            source,
        })?;
        Ok(Feature::new(self.id, geometry))
    }
}

/// Tile store persisted in a single SQLite database file.
///
/// The store keeps no open handle between calls: every operation opens its
/// own connection and drops it before returning, on success and failure
/// alike.
#[derive(Debug, Clone)]
pub struct SqliteTileStore {
    path: Utf8PathBuf,
    busy_timeout: Duration,
}

impl SqliteTileStore {
    /// Open (or create) the database at `path` and initialise the schema.
    ///
    /// Missing parent directories are created.
    ///
    /// # Examples
    /// ```
    /// use camino::Utf8PathBuf;
    /// use geotiles_core::{SqliteTileStore, TileStore};
    ///
    /// let dir = tempfile::TempDir::new().expect("create temp dir");
    /// let path = Utf8PathBuf::from_path_buf(dir.path().join("tiles.db")).expect("utf-8 path");
    /// let store = SqliteTileStore::open(&path)?;
    /// assert!(store.list()?.is_empty());
    /// # Ok::<(), geotiles_core::StoreError>(())
    /// ```
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        geotiles_fs::ensure_parent_dir(path).map_err(|source| StoreError::CreateDirectory {
            path: path.to_path_buf(),
            source,
        })?;

        let store = Self {
            path: path.to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        let connection = store.connect()?;
        connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(sqlite_error("enable WAL journal"))?;
        connection
            .execute(CREATE_SCHEMA, [])
            .map_err(sqlite_error("create tiles table"))?;
        info!("Opened tile store at {path}");
        Ok(store)
    }

    /// Override how long a connection waits for a competing writer.
    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Location of the database file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let connection =
            Connection::open(self.path.as_std_path()).map_err(|source| StoreError::Open {
                path: self.path.clone(),
                source,
            })?;
        connection
            .busy_timeout(self.busy_timeout)
            .map_err(sqlite_error("set busy timeout"))?;
        Ok(connection)
    }

    fn replace_in_transaction(
        connection: &mut Connection,
        batches: &[&[Feature]],
    ) -> Result<usize, StoreError> {
        let transaction = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite_error("begin replace transaction"))?;

        let mut written = 0usize;
        for (index, batch) in batches.iter().enumerate() {
            debug!(
                "Writing batch {}: rows {} to {}",
                index + 1,
                written,
                (written + batch.len()).saturating_sub(1)
            );
            if let Err(source) = write_batch(&transaction, index == 0, batch) {
                warn!("Batch {} failed, rolling back replace transaction", index + 1);
                return Err(StoreError::Batch {
                    index,
                    source: Box::new(source),
                });
            }
            written += batch.len();
        }

        transaction.commit().map_err(|source| StoreError::Commit {
            batches: batches.len(),
            source: Box::new(StoreError::Sqlite {
                operation: "commit replace transaction",
                source,
            }),
        })?;
        Ok(written)
    }
}

impl TileStore for SqliteTileStore {
    fn replace_all(&self, batches: &[&[Feature]]) -> Result<(), StoreError> {
        if batches.is_empty() {
            return Ok(());
        }

        let mut connection = self.connect()?;
        let outcome = Self::replace_in_transaction(&mut connection, batches);
        drop(connection);
        debug!("Released connection to {}", self.path);

        let written = outcome?;
        info!(
            "Replaced {DEFAULT_TABLE} with {written} rows in {} batches",
            batches.len()
        );
        Ok(())
    }

    fn get(&self, id: i64) -> Result<Feature, StoreError> {
        let connection = self.connect()?;
        let raw = connection
            .query_row(SELECT_ONE, [id], RawRow::read)
            .optional()
            .map_err(|source| StoreError::Row {
                id,
                operation: "read",
                source,
            })?;
        raw.ok_or(StoreError::NotFound { id })?.decode()
    }

    fn list(&self) -> Result<Vec<Feature>, StoreError> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(SELECT_ALL)
            .map_err(sqlite_error("prepare tile listing"))?;
        let rows = statement
            .query_map([], RawRow::read)
            .map_err(sqlite_error("list tiles"))?;

        let mut features = Vec::new();
        for raw in rows {
            features.push(raw.map_err(sqlite_error("read listed tile"))?.decode()?);
        }
        Ok(features)
    }

    fn insert(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
        self.write_each(rows, INSERT_RETURNING, "insert", |id| {
            // `INSERT .. RETURNING` always yields a row unless the insert fails.
            StoreError::Row {
                id,
                operation: "insert",
                source: rusqlite::Error::QueryReturnedNoRows,
            }
        })
    }

    fn update(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
        self.write_each(rows, UPDATE_RETURNING, "update", |id| StoreError::NotFound {
            id,
        })
    }

    fn delete(&self, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        let mut connection = self.connect()?;
        let transaction = connection
            .transaction()
            .map_err(sqlite_error("begin delete transaction"))?;

        let mut deleted = Vec::with_capacity(ids.len());
        {
            let mut statement = transaction
                .prepare_cached(DELETE_RETURNING)
                .map_err(sqlite_error("prepare tile delete"))?;
            for &id in ids {
                let removed = statement
                    .query_row([id], |row| row.get::<_, i64>(0))
                    .optional()
                    .map_err(|source| StoreError::Row {
                        id,
                        operation: "delete",
                        source,
                    })?;
                deleted.extend(removed);
            }
        }

        transaction
            .commit()
            .map_err(sqlite_error("commit delete transaction"))?;
        debug!("Deleted {} of {} requested tiles", deleted.len(), ids.len());
        Ok(deleted)
    }
}

impl SqliteTileStore {
    /// Run `sql` once per row inside a single transaction, collecting the
    /// values it returns. `missing` builds the error for a statement that
    /// matched no row; any error rolls the whole call back.
    fn write_each(
        &self,
        rows: &[Feature],
        sql: &str,
        operation: &'static str,
        missing: impl Fn(i64) -> StoreError,
    ) -> Result<Vec<Feature>, StoreError> {
        let mut connection = self.connect()?;
        let transaction = connection
            .transaction()
            .map_err(sqlite_error("begin write transaction"))?;

        let mut stored = Vec::with_capacity(rows.len());
        {
            let mut statement = transaction
                .prepare_cached(sql)
                .map_err(sqlite_error("prepare tile write"))?;
            for feature in rows {
                let blob = encode_feature(feature)?;
                let raw = statement
                    .query_row(params![feature.id, blob, SRID_WGS84], RawRow::read)
                    .optional()
                    .map_err(|source| StoreError::Row {
                        id: feature.id,
                        operation,
                        source,
                    })?;
                let Some(raw) = raw else {
                    warn!("Tile {} could not be written, rolling back {operation}", feature.id);
                    return Err(missing(feature.id));
                };
                stored.push(raw.decode()?);
            }
        }

        transaction
            .commit()
            .map_err(sqlite_error("commit write transaction"))?;
        debug!("Committed {operation} of {} tiles", stored.len());
        Ok(stored)
    }
}

fn write_batch(
    transaction: &Transaction<'_>,
    clear_first: bool,
    batch: &[Feature],
) -> Result<(), StoreError> {
    if clear_first {
        transaction
            .execute(CLEAR_TABLE, [])
            .map_err(sqlite_error("clear tiles table"))?;
    }

    let mut statement = transaction
        .prepare_cached(INSERT_ROW)
        .map_err(sqlite_error("prepare batch insert"))?;
    for feature in batch {
        let blob = encode_feature(feature)?;
        statement
            .execute(params![feature.id, blob, SRID_WGS84])
            .map_err(|source| StoreError::Row {
                id: feature.id,
                operation: "insert",
                source,
            })?;
    }
    Ok(())
}

fn encode_feature(feature: &Feature) -> Result<Vec<u8>, StoreError> {
    encode_wkb(&feature.geometry).map_err(|source| StoreError::Encode {
        id: feature.id,
        source,
    })
}

fn sqlite_error(operation: &'static str) -> impl Fn(rusqlite::Error) -> StoreError {
    move |source| StoreError::Sqlite { operation, source }
}
