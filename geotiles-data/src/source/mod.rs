//! Upstream feature sources.
//!
//! A [`GeometrySource`] yields the complete, ordered feature list of one
//! upstream snapshot. Ids are assigned 1..N in document order by
//! [`parse_feature_collection`]; ids present in the document are ignored.

use geotiles_core::Feature;
use thiserror::Error;

mod http;
mod parse;

pub use http::{DEFAULT_USER_AGENT, HttpGeometrySource, HttpGeometrySourceConfig, SourceBuildError};
pub use parse::parse_feature_collection;

/// Errors raised while fetching or parsing upstream features.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request could not be completed (connection failure or timeout).
    #[error("request to {url} failed: {message}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport failure description.
        message: String,
    },
    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// The body is not a well-formed GeoJSON feature collection.
    #[error("failed to parse feature collection: {message}")]
    Parse {
        /// Parser failure description.
        message: String,
    },
}

/// Source of the upstream dataset.
pub trait GeometrySource: Send + Sync {
    /// Fetch every feature of the current upstream snapshot.
    ///
    /// Implementations do not retry.
    fn fetch(&self) -> Result<Vec<Feature>, FetchError>;
}

impl<T: GeometrySource + ?Sized> GeometrySource for std::sync::Arc<T> {
    fn fetch(&self) -> Result<Vec<Feature>, FetchError> {
        (**self).fetch()
    }
}
