//! Command-line interface for the geotiles ingestion service.
#![forbid(unsafe_code)]

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use geotiles_core::SqliteTileStore;
use geotiles_data::{
    HttpGeometrySource, HttpGeometrySourceConfig, IngestionConfig, IngestionPipeline,
};
use log::info;
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

mod error;
pub mod http;
mod serve;

pub use error::{CliError, render_error_chain};

const ARG_DATABASE: &str = "database";
const ARG_SOURCE_URL: &str = "source-url";
const ARG_BATCH_SIZE: &str = "batch-size";
const ARG_FETCH_TIMEOUT_SECS: &str = "fetch-timeout-secs";
const ARG_INTERVAL_SECS: &str = "interval-secs";
const ARG_BIND: &str = "bind";

const DEFAULT_DATABASE: &str = "geotiles.db";
const DEFAULT_SOURCE_URL: &str =
    "https://karnatkageodata.blob.core.windows.net/staging/karnatkatest.geojson";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Run the geotiles CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    match cli.command {
        Command::Ingest(args) => run_ingest(&resolve_ingest_config(args)?),
        Command::Serve(args) => serve::run_serve(resolve_serve_config(args)?),
    }
}

fn resolve_ingest_config(args: IngestArgs) -> Result<IngestConfig, CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    IngestConfig::try_from(merged)
}

fn resolve_serve_config(args: ServeArgs) -> Result<ServeConfig, CliError> {
    let merged = args.load_and_merge().map_err(CliError::Configuration)?;
    ServeConfig::try_from(merged)
}

#[cfg(test)]
fn serve_config_from_layers(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<ServeConfig, CliError> {
    let merged = ServeArgs::merge_from_layers(layers).map_err(CliError::from)?;
    ServeConfig::try_from(merged)
}

fn run_ingest(config: &IngestConfig) -> Result<(), CliError> {
    let pipeline = build_pipeline(config, open_store(config)?)?;
    let report = pipeline.run();
    match report.first_error {
        Some(err) => Err(CliError::Ingestion(Box::new(err))),
        None => {
            info!(
                "Stored {} features from {} in {:?}",
                report.features_attempted, config.source_url, report.elapsed
            );
            Ok(())
        }
    }
}

type Pipeline = IngestionPipeline<HttpGeometrySource, SqliteTileStore>;

fn open_store(config: &IngestConfig) -> Result<Arc<SqliteTileStore>, CliError> {
    let store = SqliteTileStore::open(&config.database)?;
    info!("Using tile database {}", store.path());
    Ok(Arc::new(store))
}

fn build_pipeline(
    config: &IngestConfig,
    store: Arc<SqliteTileStore>,
) -> Result<Pipeline, CliError> {
    let source = HttpGeometrySource::with_config(
        HttpGeometrySourceConfig::new(config.source_url.clone()).with_timeout(config.fetch_timeout),
    )
    .map_err(|source| CliError::BuildSource {
        url: config.source_url.clone(),
        source,
    })?;
    Ok(IngestionPipeline::new(
        source,
        store,
        IngestionConfig {
            batch_size: config.batch_size,
        },
    ))
}

#[derive(Debug, Parser)]
#[command(
    name = "geotiles",
    about = "Ingest a remote GeoJSON dataset and serve it as tiles",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replace the stored tiles with the current upstream snapshot once.
    Ingest(IngestArgs),
    /// Serve the tile API and re-ingest on a fixed interval.
    Serve(ServeArgs),
}

/// CLI arguments for the `ingest` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Fetch the upstream GeoJSON document and replace the stored \
                 tiles in one transaction. Settings can come from CLI flags, \
                 configuration files, or environment variables.",
    about = "Run one ingestion"
)]
#[ortho_config(prefix = "GEOTILES")]
struct IngestArgs {
    /// Path to the SQLite tile database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    database: Option<PathBuf>,
    /// URL of the upstream GeoJSON feature collection.
    #[arg(long = ARG_SOURCE_URL, value_name = "url")]
    #[serde(default)]
    source_url: Option<String>,
    /// Features written per batch.
    #[arg(long = ARG_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    batch_size: Option<usize>,
    /// Upstream request timeout in seconds.
    #[arg(long = ARG_FETCH_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    fetch_timeout_secs: Option<u64>,
}

/// CLI arguments for the `serve` subcommand.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(
    long_about = "Serve the tile CRUD API and run ingestion immediately and \
                 then once per interval until interrupted.",
    about = "Serve tiles and ingest periodically"
)]
#[ortho_config(prefix = "GEOTILES")]
struct ServeArgs {
    /// Path to the SQLite tile database.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    database: Option<PathBuf>,
    /// URL of the upstream GeoJSON feature collection.
    #[arg(long = ARG_SOURCE_URL, value_name = "url")]
    #[serde(default)]
    source_url: Option<String>,
    /// Features written per batch.
    #[arg(long = ARG_BATCH_SIZE, value_name = "count")]
    #[serde(default)]
    batch_size: Option<usize>,
    /// Upstream request timeout in seconds.
    #[arg(long = ARG_FETCH_TIMEOUT_SECS, value_name = "seconds")]
    #[serde(default)]
    fetch_timeout_secs: Option<u64>,
    /// Seconds between the starts of consecutive ingestion runs.
    #[arg(long = ARG_INTERVAL_SECS, value_name = "seconds")]
    #[serde(default)]
    interval_secs: Option<u64>,
    /// Socket address for the HTTP listener.
    #[arg(long = ARG_BIND, value_name = "addr")]
    #[serde(default)]
    bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct IngestConfig {
    database: Utf8PathBuf,
    source_url: String,
    batch_size: NonZeroUsize,
    fetch_timeout: Duration,
}

impl IngestConfig {
    fn resolve(
        database: Option<PathBuf>,
        source_url: Option<String>,
        batch_size: Option<usize>,
        fetch_timeout_secs: Option<u64>,
    ) -> Result<Self, CliError> {
        let database = match database {
            Some(path) => Utf8PathBuf::from_path_buf(path).map_err(|path| {
                CliError::InvalidSetting {
                    field: ARG_DATABASE,
                    reason: format!("{} is not valid UTF-8", path.display()),
                }
            })?,
            None => Utf8PathBuf::from(DEFAULT_DATABASE),
        };
        let batch_size =
            NonZeroUsize::new(batch_size.unwrap_or(geotiles_data::DEFAULT_BATCH_SIZE.get()))
                .ok_or_else(|| must_be_positive(ARG_BATCH_SIZE))?;
        let fetch_timeout = positive_secs(
            fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
            ARG_FETCH_TIMEOUT_SECS,
        )?;
        Ok(Self {
            database,
            source_url: source_url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_owned()),
            batch_size,
            fetch_timeout,
        })
    }
}

impl TryFrom<IngestArgs> for IngestConfig {
    type Error = CliError;

    fn try_from(args: IngestArgs) -> Result<Self, Self::Error> {
        Self::resolve(
            args.database,
            args.source_url,
            args.batch_size,
            args.fetch_timeout_secs,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ServeConfig {
    ingest: IngestConfig,
    interval: Duration,
    bind: SocketAddr,
}

impl TryFrom<ServeArgs> for ServeConfig {
    type Error = CliError;

    fn try_from(args: ServeArgs) -> Result<Self, Self::Error> {
        let ingest = IngestConfig::resolve(
            args.database,
            args.source_url,
            args.batch_size,
            args.fetch_timeout_secs,
        )?;
        let interval = positive_secs(
            args.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS),
            ARG_INTERVAL_SECS,
        )?;
        let raw_bind = args.bind.unwrap_or_else(|| DEFAULT_BIND.to_owned());
        let bind = raw_bind
            .parse::<SocketAddr>()
            .map_err(|err| CliError::InvalidSetting {
                field: ARG_BIND,
                reason: format!("{raw_bind:?} is not a socket address: {err}"),
            })?;
        Ok(Self {
            ingest,
            interval,
            bind,
        })
    }
}

fn positive_secs(secs: u64, field: &'static str) -> Result<Duration, CliError> {
    if secs == 0 {
        return Err(must_be_positive(field));
    }
    Ok(Duration::from_secs(secs))
}

fn must_be_positive(field: &'static str) -> CliError {
    CliError::InvalidSetting {
        field,
        reason: "must be greater than zero".to_owned(),
    }
}

#[cfg(test)]
mod tests;
