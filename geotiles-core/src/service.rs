//! CRUD façade over a [`TileStore`].
//!
//! [`TileService`] converts between interchange [`Tile`] values and stored
//! [`Feature`] rows. Inputs are validated before the store is touched, and
//! every batch call is all-or-nothing because the store applies it inside one
//! transaction.

use std::sync::Arc;

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::geometry::GeometryError;
use crate::store::{StoreError, TileStore};
use crate::{Feature, Tile};

/// Errors returned by [`TileService`].
#[derive(Debug, Error)]
pub enum TileServiceError {
    /// The store holds no tiles at all.
    ///
    /// `list` reports an empty table this way, so "nothing ingested yet"
    /// looks the same as a failed lookup to API callers.
    #[error("tiles not found")]
    NoTiles,
    /// No tile exists for the id.
    #[error("tile with id {id} not found")]
    NotFound {
        /// Missing tile id.
        id: i64,
    },
    /// A submitted geometry is malformed; nothing was written.
    #[error("tile {id} has an invalid geometry: {source}")]
    Validation {
        /// Id of the offending tile.
        id: i64,
        /// Validation failure.
        #[source]
        source: GeometryError,
    },
    /// The store failed; the enclosing transaction was rolled back.
    #[error(transparent)]
    Store(StoreError),
}

impl TileServiceError {
    /// Whether the error means a requested tile (or any tile) is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoTiles | Self::NotFound { .. })
    }
}

impl From<StoreError> for TileServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { id } => Self::NotFound { id },
            other => Self::Store(other),
        }
    }
}

/// Outcome of a delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedTiles {
    /// Number of rows removed.
    pub deleted_count: usize,
    /// Ids that existed and were removed, in request order.
    pub deleted_ids: Vec<i64>,
}

/// CRUD operations over stored tiles.
#[derive(Debug)]
pub struct TileService<S> {
    store: Arc<S>,
}

impl<S> Clone for TileService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: TileStore> TileService<S> {
    /// Wrap a shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Every stored tile ordered by id, or [`TileServiceError::NoTiles`] when
    /// the table is empty.
    pub fn list(&self) -> Result<Vec<Tile>, TileServiceError> {
        let features = self.store.list()?;
        if features.is_empty() {
            return Err(TileServiceError::NoTiles);
        }
        Ok(features.into_iter().map(Tile::from).collect())
    }

    /// The tile stored under `id`.
    pub fn get(&self, id: i64) -> Result<Tile, TileServiceError> {
        self.store.get(id).map(Tile::from).map_err(Into::into)
    }

    /// Validate and insert `tiles` as one batch.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use camino::Utf8PathBuf;
    /// use geotiles_core::{SqliteTileStore, Tile, TileService};
    ///
    /// let dir = tempfile::TempDir::new().expect("create temp dir");
    /// let path = Utf8PathBuf::from_path_buf(dir.path().join("tiles.db")).expect("utf-8 path");
    /// let service = TileService::new(Arc::new(SqliteTileStore::open(&path)?));
    ///
    /// let tile: Tile = serde_json::from_str(
    ///     r#"{"id": 1, "geometry": {"type": "Point", "coordinates": [77.59, 12.97]}}"#,
    /// )
    /// .expect("valid tile JSON");
    /// let created = service.create(&[tile.clone()])?;
    /// assert_eq!(created, vec![tile]);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(&self, tiles: &[Tile]) -> Result<Vec<Tile>, TileServiceError> {
        let rows = validate_all(tiles)?;
        let inserted = self.store.insert(&rows)?;
        debug!("Created {} tiles", inserted.len());
        Ok(inserted.into_iter().map(Tile::from).collect())
    }

    /// Validate and overwrite existing tiles as one batch.
    ///
    /// Fails with [`TileServiceError::NotFound`] naming the first id that
    /// does not exist; no tile is changed in that case.
    pub fn update(&self, tiles: &[Tile]) -> Result<Vec<Tile>, TileServiceError> {
        let rows = validate_all(tiles)?;
        let updated = self.store.update(&rows)?;
        debug!("Updated {} tiles", updated.len());
        Ok(updated.into_iter().map(Tile::from).collect())
    }

    /// Delete the tiles for `ids`. Unknown ids are skipped silently.
    pub fn delete(&self, ids: &[i64]) -> Result<DeletedTiles, TileServiceError> {
        let deleted_ids = self.store.delete(ids)?;
        Ok(DeletedTiles {
            deleted_count: deleted_ids.len(),
            deleted_ids,
        })
    }
}

fn validate_all(tiles: &[Tile]) -> Result<Vec<Feature>, TileServiceError> {
    tiles
        .iter()
        .map(|tile| {
            tile.to_feature()
                .map_err(|source| TileServiceError::Validation {
                    id: tile.id,
                    source,
                })
        })
        .collect()
}

#[cfg(all(test, feature = "store-sqlite"))]
mod tests {
    use super::*;
    use crate::SqliteTileStore;
    use crate::test_support::square_feature;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    type Fixture = (TempDir, Arc<SqliteTileStore>, TileService<SqliteTileStore>);

    #[fixture]
    fn service() -> Fixture {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("tiles.db")).expect("utf-8 path");
        let store = Arc::new(SqliteTileStore::open(&path).expect("open store"));
        let service = TileService::new(Arc::clone(&store));
        (dir, store, service)
    }

    fn tile(id: i64) -> Tile {
        Tile::from(square_feature(id))
    }

    fn invalid_tile(id: i64) -> Tile {
        serde_json::from_str(&format!(
            r#"{{"id": {id}, "geometry": {{"type": "Point", "coordinates": [190.0, 12.0]}}}}"#
        ))
        .expect("well-formed JSON")
    }

    #[rstest]
    fn create_then_get_returns_equal_polygon(service: Fixture) {
        let (_dir, _store, service) = service;

        service.create(&[tile(1)]).expect("create");

        let fetched = service.get(1).expect("get");
        assert_eq!(fetched.to_feature().expect("valid"), square_feature(1));
    }

    #[rstest]
    fn list_on_empty_store_is_not_found(service: Fixture) {
        let (_dir, _store, service) = service;
        let err = service.list().expect_err("empty store");
        assert!(matches!(err, TileServiceError::NoTiles));
        assert!(err.is_not_found());
    }

    #[rstest]
    fn list_after_create_returns_that_tile(service: Fixture) {
        let (_dir, _store, service) = service;
        service.create(&[tile(4)]).expect("create");

        assert_eq!(service.list().expect("list"), vec![tile(4)]);
    }

    #[rstest]
    fn create_rejects_invalid_geometry_before_writing(service: Fixture) {
        let (_dir, store, service) = service;

        let err = service
            .create(&[tile(1), invalid_tile(2)])
            .expect_err("invalid geometry");

        assert!(matches!(err, TileServiceError::Validation { id: 2, .. }));
        assert!(store.list().expect("list").is_empty());
    }

    #[rstest]
    #[case::single_position_line(r#"{"type": "LineString", "coordinates": [[77.0, 12.0]]}"#)]
    #[case::two_position_ring(
        r#"{"type": "Polygon", "coordinates": [[[77.0, 12.0], [78.0, 13.0]]]}"#
    )]
    #[case::unclosed_ring(
        r#"{"type": "Polygon", "coordinates": [[[77.0, 12.0], [78.0, 12.0], [78.0, 13.0]]]}"#
    )]
    fn create_rejects_degenerate_shapes(service: Fixture, #[case] geometry: &str) {
        let (_dir, store, service) = service;
        let json = format!(r#"{{"id": 3, "geometry": {geometry}}}"#);
        let degenerate: Tile = serde_json::from_str(&json).expect("well-formed JSON");

        let err = service.create(&[degenerate]).expect_err("degenerate shape");

        assert!(matches!(err, TileServiceError::Validation { id: 3, .. }));
        assert!(store.list().expect("list").is_empty());
    }

    #[rstest]
    fn update_rejects_unclosed_ring_and_keeps_tile(service: Fixture) {
        let (_dir, _store, service) = service;
        service.create(&[tile(1)]).expect("seed");
        let unclosed: Tile = serde_json::from_str(
            r#"{"id": 1, "geometry": {"type": "Polygon", "coordinates": [[
                [77.0, 12.0], [78.0, 12.0], [78.0, 13.0], [77.0, 13.0]
            ]]}}"#,
        )
        .expect("well-formed JSON");

        let err = service.update(&[unclosed]).expect_err("unclosed ring");

        assert!(matches!(
            err,
            TileServiceError::Validation {
                id: 1,
                source: GeometryError::UnclosedRing,
            }
        ));
        assert_eq!(service.get(1).expect("get"), tile(1));
    }

    #[rstest]
    fn create_with_conflicting_id_is_store_error(service: Fixture) {
        let (_dir, store, service) = service;
        service.create(&[tile(2)]).expect("seed");

        let err = service
            .create(&[tile(1), tile(2)])
            .expect_err("duplicate id");

        assert!(matches!(
            err,
            TileServiceError::Store(StoreError::Row { id: 2, .. })
        ));
        assert_eq!(store.list().expect("list"), vec![square_feature(2)]);
    }

    #[rstest]
    fn update_on_empty_store_names_missing_id(service: Fixture) {
        let (_dir, store, service) = service;

        let err = service.update(&[tile(999)]).expect_err("missing id");

        assert!(matches!(err, TileServiceError::NotFound { id: 999 }));
        assert!(store.list().expect("list").is_empty());
    }

    #[rstest]
    fn update_overwrites_existing_tiles(service: Fixture) {
        let (_dir, _store, service) = service;
        service.create(&[tile(1)]).expect("seed");
        let replacement = Tile {
            id: 1,
            geometry: tile(57).geometry,
        };

        let updated = service
            .update(std::slice::from_ref(&replacement))
            .expect("update");

        assert_eq!(updated, vec![replacement.clone()]);
        assert_eq!(service.get(1).expect("get"), replacement);
    }

    #[rstest]
    fn delete_skips_unknown_ids(service: Fixture) {
        let (_dir, _store, service) = service;
        service.create(&[tile(2)]).expect("seed");

        let outcome = service.delete(&[1, 2, 3]).expect("delete");

        assert_eq!(
            outcome,
            DeletedTiles {
                deleted_count: 1,
                deleted_ids: vec![2],
            }
        );
    }

    #[rstest]
    fn get_missing_tile_is_not_found(service: Fixture) {
        let (_dir, _store, service) = service;
        let err = service.get(5).expect_err("missing");
        assert!(matches!(err, TileServiceError::NotFound { id: 5 }));
    }
}
