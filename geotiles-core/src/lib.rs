//! Core domain types for the geotiles stack.
//!
//! The crate owns the spatial data model ([`Feature`], [`Tile`]), the
//! geometry codec that moves values between the in-memory, stored and
//! interchange forms, the [`TileStore`] persistence trait with its SQLite
//! implementation, and the [`TileService`] CRUD façade.
//!
//! Invariants:
//! - Every geometry is WGS84 longitude/latitude (SRID 4326).
//! - Mutating store calls are atomic over their whole input.
//! - No global state: stores are constructed explicitly and shared by `Arc`.

#![forbid(unsafe_code)]

mod feature;
pub mod geometry;
pub mod service;
pub mod store;
mod tile;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use feature::Feature;
pub use geometry::{GeometryError, SRID_WGS84};
pub use service::{DeletedTiles, TileService, TileServiceError};
pub use store::{StoreError, TileStore};
pub use tile::Tile;

#[cfg(feature = "store-sqlite")]
pub use store::SqliteTileStore;
