//! Ingestion of remote GeoJSON datasets for the geotiles service.
//!
//! Responsibilities:
//! - Fetch and parse the upstream feature collection ([`source`]).
//! - Replace the stored tiles in bounded batches inside one transaction
//!   ([`IngestionPipeline`]).
//! - Re-run ingestion on a fixed cadence ([`IngestionSchedule`]).
//!
//! Boundaries:
//! - Persistence lives behind [`geotiles_core::TileStore`]; this crate never
//!   touches SQL.
//! - Blocking work runs on Tokio's blocking pool when driven by the schedule.

mod pipeline;
mod schedule;
pub mod source;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use pipeline::{
    DEFAULT_BATCH_SIZE, IngestionConfig, IngestionError, IngestionPipeline, IngestionReport,
};
pub use schedule::{IngestionJob, IngestionSchedule};
pub use source::{
    FetchError, GeometrySource, HttpGeometrySource, HttpGeometrySourceConfig, SourceBuildError,
    parse_feature_collection,
};
