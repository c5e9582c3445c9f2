//! Test utilities for ingestion.
//!
//! [`StubGeometrySource`] is a deterministic [`GeometrySource`] that returns
//! pre-configured features or a pre-configured error without any network
//! access.

use std::sync::atomic::{AtomicUsize, Ordering};

use geotiles_core::Feature;

use crate::source::{FetchError, GeometrySource};

/// Stub `GeometrySource` for testing.
///
/// # Example
///
/// ```
/// use geotiles_core::test_support::square_features;
/// use geotiles_data::GeometrySource;
/// use geotiles_data::test_support::StubGeometrySource;
///
/// let source = StubGeometrySource::with_features(square_features(2));
/// assert_eq!(source.fetch().expect("stub features").len(), 2);
/// assert_eq!(source.calls(), 1);
/// ```
#[derive(Debug)]
pub struct StubGeometrySource {
    response: StubResponse,
    calls: AtomicUsize,
}

#[derive(Debug, Clone)]
enum StubResponse {
    Features(Vec<Feature>),
    Error(FetchError),
}

impl StubGeometrySource {
    /// Create a source that returns `features` on every fetch.
    #[must_use]
    pub fn with_features(features: Vec<Feature>) -> Self {
        Self {
            response: StubResponse::Features(features),
            calls: AtomicUsize::new(0),
        }
    }

    /// Create a source that fails every fetch with `error`.
    #[must_use]
    pub fn with_error(error: FetchError) -> Self {
        Self {
            response: StubResponse::Error(error),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of fetches served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl GeometrySource for StubGeometrySource {
    fn fetch(&self) -> Result<Vec<Feature>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            StubResponse::Features(features) => Ok(features.clone()),
            StubResponse::Error(error) => Err(error.clone()),
        }
    }
}
