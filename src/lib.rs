//! Facade crate for the geotiles ingestion and CRUD stack.
//!
//! This crate re-exports the domain types and the tile service, and exposes
//! the SQLite store and the ingestion pipeline behind feature flags.

#![forbid(unsafe_code)]

pub use geotiles_core::{
    DeletedTiles, Feature, GeometryError, SRID_WGS84, StoreError, Tile, TileService,
    TileServiceError, TileStore,
};

#[cfg(feature = "store-sqlite")]
pub use geotiles_core::SqliteTileStore;

#[cfg(feature = "ingest")]
pub use geotiles_data::{
    DEFAULT_BATCH_SIZE, FetchError, GeometrySource, HttpGeometrySource, HttpGeometrySourceConfig,
    IngestionConfig, IngestionError, IngestionJob, IngestionPipeline, IngestionReport,
    IngestionSchedule, SourceBuildError, parse_feature_collection,
};
