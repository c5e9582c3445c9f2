//! Error types emitted by the geotiles CLI.
//!
//! Keep this error type reasonably small, as many CLI helpers return
//! `Result<_, CliError>` and the workspace enables `clippy::result_large_err`.

use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;

use geotiles_core::StoreError;
use geotiles_data::{IngestionError, SourceBuildError};
use thiserror::Error;

/// Errors emitted by the geotiles CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A setting was present but unusable.
    #[error("invalid {field}: {reason}")]
    InvalidSetting {
        field: &'static str,
        reason: String,
    },
    /// Opening the tile store failed.
    #[error("failed to open tile store: {0}")]
    OpenStore(#[source] Box<StoreError>),
    /// Constructing the upstream source failed.
    #[error("failed to build source for {url:?}: {source}")]
    BuildSource {
        url: String,
        #[source]
        source: SourceBuildError,
    },
    /// A one-shot ingestion run failed; the stored tiles are unchanged.
    #[error("ingestion failed: {0}")]
    Ingestion(#[source] Box<IngestionError>),
    /// Building the async runtime failed.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
    /// Binding the HTTP listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The HTTP server stopped with an I/O error.
    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl From<StoreError> for CliError {
    fn from(error: StoreError) -> Self {
        Self::OpenStore(Box::new(error))
    }
}

/// Render `error` followed by every cause in its `source()` chain.
///
/// Causes whose text already appears in the rendered message are skipped,
/// so variants that embed their source are not printed twice.
pub fn render_error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut cause = error.source();
    while let Some(current) = cause {
        let text = current.to_string();
        if !rendered.contains(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        cause = current.source();
    }
    rendered
}
