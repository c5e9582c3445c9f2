//! Fetch → batch → transactional replace.
//!
//! One run fetches the whole upstream snapshot, splits it into batches of
//! [`IngestionConfig::batch_size`] features, and hands every batch to
//! [`TileStore::replace_all`], which applies them inside a single
//! transaction. The table therefore holds either the previous snapshot or
//! the new one, never a mixture.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geo::{BoundingRect, Coord, Rect};
use geotiles_core::{Feature, StoreError, TileStore};
use log::{error, info, warn};
use thiserror::Error;

use crate::source::{FetchError, GeometrySource};

/// Default number of features written per batch.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);

/// Tuning for [`IngestionPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionConfig {
    /// Upper bound on features per batch.
    pub batch_size: NonZeroUsize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Failure recorded in an [`IngestionReport`].
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Fetching or parsing the upstream document failed; the store was not
    /// touched.
    #[error("failed to fetch upstream features")]
    Fetch(#[source] FetchError),
    /// Writing to the store failed; the transaction was rolled back.
    #[error("failed to replace stored tiles")]
    Store(#[source] StoreError),
}

impl From<FetchError> for IngestionError {
    fn from(error: FetchError) -> Self {
        Self::Fetch(error)
    }
}

impl From<StoreError> for IngestionError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

/// Outcome of one ingestion run.
#[derive(Debug)]
pub struct IngestionReport {
    /// Whether the new snapshot was committed (or the upstream was empty).
    pub succeeded: bool,
    /// Number of features fetched from upstream.
    pub features_attempted: usize,
    /// Batches written before the run stopped, including a failing batch.
    pub batches_attempted: usize,
    /// First failure of the run, if any.
    pub first_error: Option<IngestionError>,
    /// Longitude/latitude extent of the fetched features.
    pub bounds: Option<Rect<f64>>,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

/// Replaces the stored tiles with the current upstream snapshot.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use camino::Utf8PathBuf;
/// use geotiles_core::{Feature, SqliteTileStore, TileStore};
/// use geotiles_core::test_support::square_features;
/// use geotiles_data::{FetchError, GeometrySource, IngestionConfig, IngestionPipeline};
///
/// struct Fixed(Vec<Feature>);
///
/// impl GeometrySource for Fixed {
///     fn fetch(&self) -> Result<Vec<Feature>, FetchError> {
///         Ok(self.0.clone())
///     }
/// }
///
/// let dir = tempfile::TempDir::new().expect("create temp dir");
/// let path = Utf8PathBuf::from_path_buf(dir.path().join("tiles.db")).expect("utf-8 path");
/// let store = Arc::new(SqliteTileStore::open(&path)?);
/// let source = Fixed(square_features(3));
///
/// let pipeline = IngestionPipeline::new(source, Arc::clone(&store), IngestionConfig::default());
/// let report = pipeline.run();
///
/// assert!(report.succeeded);
/// assert_eq!(store.list()?.len(), 3);
/// # Ok::<(), geotiles_core::StoreError>(())
/// ```
#[derive(Debug)]
pub struct IngestionPipeline<G, S> {
    source: G,
    store: Arc<S>,
    config: IngestionConfig,
}

impl<G: GeometrySource, S: TileStore> IngestionPipeline<G, S> {
    /// Assemble a pipeline writing features from `source` into `store`.
    pub fn new(source: G, store: Arc<S>, config: IngestionConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Batch configuration in use.
    pub fn config(&self) -> IngestionConfig {
        self.config
    }

    /// Upstream source the pipeline fetches from.
    pub fn source(&self) -> &G {
        &self.source
    }

    /// Run one ingestion.
    ///
    /// Failures are reported in the returned [`IngestionReport`] rather than
    /// as an `Err`, so a scheduler can keep running after a bad cycle.
    pub fn run(&self) -> IngestionReport {
        let started = Instant::now();
        info!(
            "Starting ingestion run with batch size {}",
            self.config.batch_size
        );

        let features = match self.source.fetch() {
            Ok(features) => features,
            Err(err) => {
                error!("Ingestion run aborted before writing: {err}");
                return IngestionReport {
                    succeeded: false,
                    features_attempted: 0,
                    batches_attempted: 0,
                    first_error: Some(err.into()),
                    bounds: None,
                    elapsed: started.elapsed(),
                };
            }
        };
        let bounds = bounds_of(&features);

        if features.is_empty() {
            warn!("Upstream returned no features; keeping the stored tiles");
            return IngestionReport {
                succeeded: true,
                features_attempted: 0,
                batches_attempted: 0,
                first_error: None,
                bounds,
                elapsed: started.elapsed(),
            };
        }

        let batches: Vec<&[Feature]> = features.chunks(self.config.batch_size.get()).collect();
        let outcome = self.store.replace_all(&batches);
        let elapsed = started.elapsed();
        match outcome {
            Ok(()) => {
                info!(
                    "Ingestion committed {} features in {} batches after {elapsed:?}",
                    features.len(),
                    batches.len()
                );
                IngestionReport {
                    succeeded: true,
                    features_attempted: features.len(),
                    batches_attempted: batches.len(),
                    first_error: None,
                    bounds,
                    elapsed,
                }
            }
            Err(err) => {
                let batches_attempted = err.batches_attempted();
                error!(
                    "Ingestion rolled back after {batches_attempted} of {} batches: {err}",
                    batches.len()
                );
                IngestionReport {
                    succeeded: false,
                    features_attempted: features.len(),
                    batches_attempted,
                    first_error: Some(err.into()),
                    bounds,
                    elapsed,
                }
            }
        }
    }
}

fn bounds_of(features: &[Feature]) -> Option<Rect<f64>> {
    features
        .iter()
        .filter_map(|feature| feature.geometry.bounding_rect())
        .reduce(merge_bounds)
}

fn merge_bounds(left: Rect<f64>, right: Rect<f64>) -> Rect<f64> {
    let (left_min, left_max) = (left.min(), left.max());
    let (right_min, right_max) = (right.min(), right.max());
    Rect::new(
        Coord {
            x: left_min.x.min(right_min.x),
            y: left_min.y.min(right_min.y),
        },
        Coord {
            x: left_max.x.max(right_max.x),
            y: left_max.y.max(right_max.y),
        },
    )
}
