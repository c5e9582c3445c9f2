//! Persistence traits for ingested features.
//!
//! The [`TileStore`] trait is the only path by which the ingestion pipeline
//! and the tile service touch persisted rows. Every mutating operation is
//! atomic over its whole input: either all rows are applied or none are.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::Feature;
use crate::geometry::GeometryError;

#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use sqlite::{DEFAULT_TABLE, SqliteTileStore};

/// Errors raised by [`TileStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the parent directory of the database file.
    #[error("failed to create parent directory for {path:?}")]
    CreateDirectory {
        /// Database path whose parent could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Opening a database connection failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to open SQLite database at {path:?}")]
    Open {
        /// Location of the database on disk.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A statement not tied to a specific row failed.
    #[cfg(feature = "store-sqlite")]
    #[error("SQLite operation failed: {operation}")]
    Sqlite {
        /// Short description of the failed operation.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// Writing or reading a specific row failed.
    #[cfg(feature = "store-sqlite")]
    #[error("failed to {operation} tile {id}")]
    Row {
        /// Id of the failing row.
        id: i64,
        /// Short description of the failed operation.
        operation: &'static str,
        /// Source error returned by `rusqlite`.
        #[source]
        source: rusqlite::Error,
    },
    /// A geometry could not be encoded into the native spatial value.
    #[error("failed to encode geometry for tile {id}")]
    Encode {
        /// Id of the row being written.
        id: i64,
        /// Codec failure.
        #[source]
        source: GeometryError,
    },
    /// A stored spatial value could not be decoded.
    #[error("failed to decode stored geometry for tile {id}")]
    Decode {
        /// Id of the row being read.
        id: i64,
        /// Codec failure.
        #[source]
        source: GeometryError,
    },
    /// No row exists for the requested id.
    #[error("tile {id} not found")]
    NotFound {
        /// Id that was looked up.
        id: i64,
    },
    /// A bulk replace failed while writing one of its batches.
    #[error("failed to write batch {index}")]
    Batch {
        /// Zero-based index of the failing batch.
        index: usize,
        /// Failure raised while writing the batch.
        #[source]
        source: Box<StoreError>,
    },
    /// Every batch of a bulk replace was written but the commit failed, so
    /// nothing was applied.
    #[error("failed to commit replace after {batches} batches")]
    Commit {
        /// Number of batches written before the commit.
        batches: usize,
        /// Failure raised by the commit.
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Id of the row that caused the failure, when one is known.
    pub fn failing_id(&self) -> Option<i64> {
        match self {
            #[cfg(feature = "store-sqlite")]
            Self::Row { id, .. } => Some(*id),
            Self::Encode { id, .. } | Self::Decode { id, .. } | Self::NotFound { id } => Some(*id),
            Self::Batch { source, .. } | Self::Commit { source, .. } => source.failing_id(),
            _ => None,
        }
    }

    /// Zero-based index of the batch that failed during a bulk replace.
    pub fn batch_index(&self) -> Option<usize> {
        match self {
            Self::Batch { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Number of batches a bulk replace had started when it failed.
    ///
    /// Zero when the failure happened before the first batch was written,
    /// such as opening the connection or beginning the transaction.
    pub fn batches_attempted(&self) -> usize {
        match self {
            Self::Batch { index, .. } => index.saturating_add(1),
            Self::Commit { batches, .. } => *batches,
            _ => 0,
        }
    }
}

/// Spatial table keyed by integer id, one SRID-4326 geometry per row.
///
/// Implementations must acquire their connection per call and release it on
/// every exit path. Readers running while [`TileStore::replace_all`] is in
/// flight must observe either the previous or the new contents, never a
/// partial batch.
///
/// # Examples
///
/// ```rust
/// use std::sync::Mutex;
/// use geotiles_core::{Feature, StoreError, TileStore};
///
/// #[derive(Default)]
/// struct VecStore {
///     rows: Mutex<Vec<Feature>>,
/// }
///
/// impl TileStore for VecStore {
///     fn replace_all(&self, batches: &[&[Feature]]) -> Result<(), StoreError> {
///         if batches.is_empty() {
///             return Ok(());
///         }
///         let mut rows = self.rows.lock().expect("lock");
///         *rows = batches.iter().flat_map(|batch| batch.iter().cloned()).collect();
///         Ok(())
///     }
///
///     fn get(&self, id: i64) -> Result<Feature, StoreError> {
///         let rows = self.rows.lock().expect("lock");
///         rows.iter()
///             .find(|row| row.id == id)
///             .cloned()
///             .ok_or(StoreError::NotFound { id })
///     }
///
///     fn list(&self) -> Result<Vec<Feature>, StoreError> {
///         Ok(self.rows.lock().expect("lock").clone())
///     }
///
///     fn insert(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
///         self.rows.lock().expect("lock").extend_from_slice(rows);
///         Ok(rows.to_vec())
///     }
///
///     fn update(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
///         Ok(rows.to_vec())
///     }
///
///     fn delete(&self, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
///         let mut rows = self.rows.lock().expect("lock");
///         let deleted: Vec<i64> = ids
///             .iter()
///             .copied()
///             .filter(|id| rows.iter().any(|row| row.id == *id))
///             .collect();
///         rows.retain(|row| !deleted.contains(&row.id));
///         Ok(deleted)
///     }
/// }
///
/// let store = VecStore::default();
/// assert!(store.list()?.is_empty());
/// assert!(matches!(store.get(1), Err(StoreError::NotFound { id: 1 })));
/// # Ok::<(), StoreError>(())
/// ```
pub trait TileStore: Send + Sync {
    /// Replace the whole table with the rows of `batches`, in one transaction.
    ///
    /// The first batch clears the previous contents inside the transaction;
    /// later batches append. A failing batch rolls everything back and is
    /// reported as [`StoreError::Batch`]. An empty slice is a no-op.
    fn replace_all(&self, batches: &[&[Feature]]) -> Result<(), StoreError>;

    /// Fetch one row, or [`StoreError::NotFound`].
    fn get(&self, id: i64) -> Result<Feature, StoreError>;

    /// Fetch every row ordered by id. An empty table yields an empty vector.
    fn list(&self) -> Result<Vec<Feature>, StoreError>;

    /// Insert `rows` atomically and return the stored values.
    fn insert(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError>;

    /// Overwrite existing rows atomically and return the stored values.
    ///
    /// A missing id aborts the whole call with [`StoreError::NotFound`].
    fn update(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError>;

    /// Delete the rows for `ids` atomically and return the ids that existed.
    fn delete(&self, ids: &[i64]) -> Result<Vec<i64>, StoreError>;
}

impl<T: TileStore + ?Sized> TileStore for Arc<T> {
    fn replace_all(&self, batches: &[&[Feature]]) -> Result<(), StoreError> {
        (**self).replace_all(batches)
    }

    fn get(&self, id: i64) -> Result<Feature, StoreError> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<Feature>, StoreError> {
        (**self).list()
    }

    fn insert(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
        (**self).insert(rows)
    }

    fn update(&self, rows: &[Feature]) -> Result<Vec<Feature>, StoreError> {
        (**self).update(rows)
    }

    fn delete(&self, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        (**self).delete(ids)
    }
}
