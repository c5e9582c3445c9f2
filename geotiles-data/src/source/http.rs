//! HTTP [`GeometrySource`] for a remote GeoJSON document.
//!
//! [`GeometrySource::fetch`] is synchronous so the pipeline can run on a
//! plain thread. This source bridges the async `reqwest` client to that
//! interface by blocking on a Tokio runtime it owns.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use geotiles_data::{GeometrySource, HttpGeometrySource, HttpGeometrySourceConfig};
//!
//! let config = HttpGeometrySourceConfig::new("https://example.org/tiles.geojson")
//!     .with_timeout(Duration::from_secs(10));
//! let source = HttpGeometrySource::with_config(config)?;
//! let features = source.fetch()?;
//! println!("fetched {} features", features.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use geotiles_core::Feature;
use log::{debug, info};
use reqwest::Client;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use super::{FetchError, GeometrySource, parse_feature_collection};

/// Errors raised while constructing an [`HttpGeometrySource`].
#[derive(Debug, Error)]
pub enum SourceBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Default user agent for upstream requests.
pub const DEFAULT_USER_AGENT: &str = "geotiles-ingest/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for [`HttpGeometrySource`].
#[derive(Debug, Clone)]
pub struct HttpGeometrySourceConfig {
    /// Location of the GeoJSON document.
    pub url: String,
    /// Bound on both connection setup and the whole request.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl HttpGeometrySourceConfig {
    /// Create a configuration for `url` with the default timeout and agent.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Fetches the upstream feature collection over HTTP.
///
/// # Runtime behaviour
///
/// Outside any Tokio runtime, and inside a `current_thread` runtime, requests
/// run on the source's own runtime. Inside a multi-threaded runtime the
/// caller's handle drives the request under [`tokio::task::block_in_place`].
pub struct HttpGeometrySource {
    client: Client,
    config: HttpGeometrySourceConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpGeometrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGeometrySource")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish()
    }
}

impl HttpGeometrySource {
    /// Create a source for `url` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn new(url: impl Into<String>) -> Result<Self, SourceBuildError> {
        Self::with_config(HttpGeometrySourceConfig::new(url))
    }

    /// Create a source with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or Tokio runtime fails to build.
    pub fn with_config(config: HttpGeometrySourceConfig) -> Result<Self, SourceBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(SourceBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(SourceBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// Configured document location.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    async fn fetch_async(&self) -> Result<Vec<Feature>, FetchError> {
        let url = self.url();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|err| self.convert_reqwest_error(&err))?;
        debug!("Received {} bytes from {url}", body.len());
        parse_feature_collection(&body)
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error) -> FetchError {
        let url = self.url().to_owned();
        if error.is_timeout() {
            return FetchError::Network {
                url,
                message: format!("timed out after {} s", self.config.timeout.as_secs()),
            };
        }

        if let Some(status) = error.status() {
            return FetchError::HttpStatus {
                url,
                status: status.as_u16(),
            };
        }

        FetchError::Network {
            url,
            message: error.to_string(),
        }
    }
}

impl GeometrySource for HttpGeometrySource {
    fn fetch(&self) -> Result<Vec<Feature>, FetchError> {
        info!("Fetching features from {}", self.url());
        let future = self.fetch_async();
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }
}
