//! Long-running `serve` mode: the tile API plus periodic ingestion.

use std::sync::Arc;

use geotiles_core::{SqliteTileStore, TileService};
use geotiles_data::IngestionSchedule;
use log::{debug, info, warn};
use tokio::sync::watch;

use crate::{CliError, Pipeline, ServeConfig, build_pipeline, http, open_store};

/// Serve the tile API and re-ingest on `config.interval` until Ctrl-C.
///
/// The pipeline owns a Tokio runtime of its own, so it is built and dropped
/// outside the server runtime.
pub(crate) fn run_serve(config: ServeConfig) -> Result<(), CliError> {
    let store = open_store(&config.ingest)?;
    let job = Arc::new(build_pipeline(&config.ingest, Arc::clone(&store))?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::Runtime)?;

    let result = runtime.block_on(serve(&config, store, Arc::clone(&job)));
    drop(runtime);
    drop(job);
    result
}

async fn serve(
    config: &ServeConfig,
    store: Arc<SqliteTileStore>,
    job: Arc<Pipeline>,
) -> Result<(), CliError> {
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|source| CliError::Bind {
            addr: config.bind,
            source,
        })?;
    info!("Serving tiles on http://{}", config.bind);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(forward_ctrl_c(stop_tx));

    let schedule = IngestionSchedule::new(config.interval);
    let ingestion = tokio::spawn({
        let stop = stopped(stop_rx.clone());
        async move { schedule.run_until(job, stop).await }
    });

    let served = axum::serve(listener, http::router(TileService::new(store)))
        .with_graceful_shutdown(stopped(stop_rx))
        .await
        .map_err(CliError::Serve);

    match ingestion.await {
        Ok(runs) => debug!("Ingestion schedule finished after {runs} runs"),
        Err(err) => warn!("Ingestion schedule task failed: {err}"),
    }
    served
}

async fn forward_ctrl_c(stop: watch::Sender<bool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // Keep the sender alive so a broken signal handler does not stop the server.
        warn!("Failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    stop.send_replace(true);
}

async fn stopped(mut stop: watch::Receiver<bool>) {
    if stop.wait_for(|requested| *requested).await.is_err() {
        debug!("Shutdown sender dropped");
    }
}
