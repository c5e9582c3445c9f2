//! Behavioural coverage for the ingestion pipeline.

use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::sync::Arc;

use camino::Utf8PathBuf;
use geotiles_core::test_support::square_features;
use geotiles_core::{Feature, SqliteTileStore, TileStore};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use rusqlite::Connection;
use tempfile::TempDir;

use crate::test_support::StubGeometrySource;
use crate::{FetchError, IngestionConfig, IngestionError, IngestionPipeline, IngestionReport};

struct IngestionScenarioContext {
    _temp_dir: TempDir,
    store: Arc<SqliteTileStore>,
    seeded: RefCell<Vec<Feature>>,
    upstream: RefCell<Vec<Feature>>,
    source: RefCell<Option<StubGeometrySource>>,
    report: RefCell<Option<IngestionReport>>,
}

impl IngestionScenarioContext {
    fn new() -> Self {
        let temp_dir = match TempDir::new() {
            Ok(dir) => dir,
            Err(err) => panic!("failed to create temporary directory: {err}"),
        };
        let path = match Utf8PathBuf::from_path_buf(temp_dir.path().join("tiles.db")) {
            Ok(path) => path,
            Err(path) => panic!("temporary path is not UTF-8: {path:?}"),
        };
        let store = match SqliteTileStore::open(&path) {
            Ok(store) => Arc::new(store),
            Err(err) => panic!("failed to open tile store: {err}"),
        };
        Self {
            _temp_dir: temp_dir,
            store,
            seeded: RefCell::new(Vec::new()),
            upstream: RefCell::new(Vec::new()),
            source: RefCell::new(None),
            report: RefCell::new(None),
        }
    }

    fn stored(&self) -> Vec<Feature> {
        match self.store.list() {
            Ok(rows) => rows,
            Err(err) => panic!("failed to list stored tiles: {err}"),
        }
    }

    fn with_report<T>(&self, check: impl FnOnce(&IngestionReport) -> T) -> T {
        let borrowed = self.report.borrow();
        let report = borrowed
            .as_ref()
            .unwrap_or_else(|| panic!("the pipeline must have run"));
        check(report)
    }
}

#[fixture]
fn ingestion_context() -> IngestionScenarioContext {
    IngestionScenarioContext::new()
}

#[given("a tile store seeded with 5 tiles")]
fn seeded_store(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    // Seed ids far from the upstream range so a successful run is observable.
    let rows: Vec<Feature> = square_features(5)
        .into_iter()
        .map(|feature| Feature::new(feature.id + 5000, feature.geometry))
        .collect();
    if let Err(err) = ctx.store.replace_all(&[&rows]) {
        panic!("failed to seed store: {err}");
    }
    *ctx.seeded.borrow_mut() = rows;
}

#[given("an upstream snapshot of 1500 features")]
fn upstream_snapshot(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    let features = square_features(1500);
    *ctx.source.borrow_mut() = Some(StubGeometrySource::with_features(features.clone()));
    *ctx.upstream.borrow_mut() = features;
}

#[given("an upstream that times out")]
fn upstream_timeout(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    *ctx.source.borrow_mut() = Some(StubGeometrySource::with_error(FetchError::Network {
        url: "http://example.com/tiles.geojson".to_owned(),
        message: "timed out after 30 s".to_owned(),
    }));
}

#[given("the store rejects tile 1200")]
fn store_rejects_tile(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    let conn = match Connection::open(ctx.store.path().as_std_path()) {
        Ok(conn) => conn,
        Err(err) => panic!("failed to open raw connection: {err}"),
    };
    let trigger = "CREATE TRIGGER reject_tile BEFORE INSERT ON karnataka_tiles
        WHEN NEW.id = 1200
        BEGIN SELECT RAISE(ABORT, 'rejected by test'); END;";
    if let Err(err) = conn.execute_batch(trigger) {
        panic!("failed to install trigger: {err}");
    }
}

#[when("the ingestion pipeline runs with batches of 1000")]
fn run_pipeline(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    let Some(source) = ctx.source.borrow_mut().take() else {
        panic!("an upstream must be configured");
    };
    let config = IngestionConfig {
        batch_size: NonZeroUsize::MIN.saturating_add(999),
    };
    let pipeline = IngestionPipeline::new(source, Arc::clone(&ctx.store), config);
    *ctx.report.borrow_mut() = Some(pipeline.run());
}

#[then("the run succeeds after 2 batches")]
fn run_succeeds(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    ctx.with_report(|report| {
        assert!(report.succeeded, "unexpected failure: {:?}", report.first_error);
        assert_eq!(report.batches_attempted, 2);
        assert_eq!(report.features_attempted, 1500);
    });
}

#[then("the run fails in batch 2")]
fn run_fails_in_second_batch(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    ctx.with_report(|report| {
        assert!(!report.succeeded);
        assert_eq!(report.batches_attempted, 2);
        match &report.first_error {
            Some(IngestionError::Store(err)) => assert_eq!(err.batch_index(), Some(1)),
            other => panic!("expected a store error, got {other:?}"),
        }
    });
}

#[then("the run fails before writing")]
fn run_fails_before_writing(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    ctx.with_report(|report| {
        assert!(!report.succeeded);
        assert_eq!(report.batches_attempted, 0);
        assert!(matches!(report.first_error, Some(IngestionError::Fetch(_))));
    });
}

#[then("the store holds the upstream snapshot")]
fn store_holds_upstream(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    assert_eq!(ctx.stored(), *ctx.upstream.borrow());
}

#[then("the store still holds the 5 seeded tiles")]
fn store_holds_seeded(#[from(ingestion_context)] ctx: &IngestionScenarioContext) {
    assert_eq!(ctx.stored(), *ctx.seeded.borrow());
}

macro_rules! register_scenario {
    ($name:ident, $title:literal) => {
        #[scenario(path = "tests/features/ingestion.feature", name = $title)]
        fn $name(#[from(ingestion_context)] ctx: IngestionScenarioContext) {
            let _ = ctx;
        }
    };
}

register_scenario!(loading_a_fresh_snapshot, "loading a fresh snapshot");
register_scenario!(rolling_back_a_failed_batch, "rolling back a failed batch");
register_scenario!(surviving_an_upstream_outage, "surviving an upstream outage");
