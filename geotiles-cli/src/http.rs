//! Axum routes exposing [`TileService`] over HTTP.
//!
//! Every service call runs on Tokio's blocking pool so SQLite I/O never
//! stalls the executor. Errors are rendered as `{"detail": "<message>"}`.

use axum::{
    Json, Router,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use geotiles_core::{Tile, TileService, TileServiceError, TileStore};
use serde::Serialize;
use serde_json::json;

/// Build the `/tiles/` router over `service`.
pub fn router<S: TileStore + 'static>(service: TileService<S>) -> Router {
    Router::new()
        .route(
            "/tiles/",
            get(list_tiles::<S>)
                .post(create_tiles::<S>)
                .put(update_tiles::<S>)
                .delete(delete_tiles::<S>),
        )
        .route("/tiles/{id}", get(get_tile::<S>))
        .with_state(service)
}

/// Error response carrying a status and a human-readable detail.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<TileServiceError> for ApiError {
    fn from(error: TileServiceError) -> Self {
        let status = match &error {
            TileServiceError::NoTiles | TileServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            TileServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            TileServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            log::warn!("tile request failed: {error}");
        }
        Self {
            status,
            detail: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    detail: String,
    deleted_ids: Vec<i64>,
}

async fn on_blocking_pool<S, T, F>(service: TileService<S>, call: F) -> Result<T, ApiError>
where
    S: TileStore + 'static,
    T: Send + 'static,
    F: FnOnce(&TileService<S>) -> Result<T, TileServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|err| ApiError::internal(format!("tile request did not complete: {err}")))?
        .map_err(ApiError::from)
}

async fn list_tiles<S: TileStore + 'static>(
    State(service): State<TileService<S>>,
) -> Result<Json<Vec<Tile>>, ApiError> {
    log::debug!("handle list request");
    on_blocking_pool(service, |service| service.list())
        .await
        .map(Json)
}

async fn get_tile<S: TileStore + 'static>(
    State(service): State<TileService<S>>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Tile>, ApiError> {
    let Path(id) = id?;
    log::debug!("handle get request for tile {id}");
    on_blocking_pool(service, move |service| service.get(id))
        .await
        .map(Json)
}

async fn create_tiles<S: TileStore + 'static>(
    State(service): State<TileService<S>>,
    body: Result<Json<Vec<Tile>>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Tile>>), ApiError> {
    let Json(tiles) = body?;
    log::debug!("handle create request for {} tiles", tiles.len());
    let created = on_blocking_pool(service, move |service| service.create(&tiles)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_tiles<S: TileStore + 'static>(
    State(service): State<TileService<S>>,
    body: Result<Json<Vec<Tile>>, JsonRejection>,
) -> Result<Json<Vec<Tile>>, ApiError> {
    let Json(tiles) = body?;
    log::debug!("handle update request for {} tiles", tiles.len());
    on_blocking_pool(service, move |service| service.update(&tiles))
        .await
        .map(Json)
}

async fn delete_tiles<S: TileStore + 'static>(
    State(service): State<TileService<S>>,
    body: Result<Json<Vec<i64>>, JsonRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let Json(ids) = body?;
    log::debug!("handle delete request for {} ids", ids.len());
    let deleted = on_blocking_pool(service, move |service| service.delete(&ids)).await?;
    Ok(Json(DeleteResponse {
        detail: format!("{} tiles deleted successfully", deleted.deleted_count),
        deleted_ids: deleted.deleted_ids,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, header};
    use camino::Utf8PathBuf;
    use geotiles_core::SqliteTileStore;
    use geotiles_core::test_support::square_feature;
    use rstest::{fixture, rstest};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt as _;

    struct App {
        _dir: TempDir,
        service: TileService<SqliteTileStore>,
    }

    impl App {
        fn router(&self) -> Router {
            router(self.service.clone())
        }
    }

    #[fixture]
    fn app() -> App {
        let dir = TempDir::new().expect("create temp dir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("tiles.db")).expect("utf-8 path");
        let store = Arc::new(SqliteTileStore::open(&path).expect("open store"));
        App {
            _dir: dir,
            service: TileService::new(store),
        }
    }

    fn tile_json(id: i64) -> Value {
        serde_json::to_value(Tile::from(square_feature(id))).expect("serialise tile")
    }

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");
        let response = router.oneshot(request).await.expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let value = serde_json::from_slice(&bytes).expect("JSON response body");
        (status, value)
    }

    #[rstest]
    #[tokio::test]
    async fn list_on_empty_store_is_404(app: App) {
        let (status, body) = send(app.router(), "GET", "/tiles/", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "tiles not found"}));
    }

    #[rstest]
    #[tokio::test]
    async fn create_returns_201_and_tile_is_readable(app: App) {
        let (status, body) =
            send(app.router(), "POST", "/tiles/", Some(json!([tile_json(1)]))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!([tile_json(1)]));

        let (status, body) = send(app.router(), "GET", "/tiles/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, tile_json(1));

        let (status, body) = send(app.router(), "GET", "/tiles/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([tile_json(1)]));
    }

    #[rstest]
    #[tokio::test]
    async fn missing_tile_is_404(app: App) {
        let (status, body) = send(app.router(), "GET", "/tiles/42", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "tile with id 42 not found"}));
    }

    #[rstest]
    #[tokio::test]
    async fn non_numeric_id_is_400(app: App) {
        let (status, body) = send(app.router(), "GET", "/tiles/abc", None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("detail").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn invalid_geometry_is_400_and_nothing_is_written(app: App) {
        let invalid = json!({"id": 2, "geometry": {"type": "Point", "coordinates": [500.0, 0.0]}});

        let (status, _body) = send(
            app.router(),
            "POST",
            "/tiles/",
            Some(json!([tile_json(1), invalid])),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _body) = send(app.router(), "GET", "/tiles/1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_body_is_400(app: App) {
        let (status, body) = send(
            app.router(),
            "POST",
            "/tiles/",
            Some(json!({"not": "a list"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.get("detail").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_create_is_500(app: App) {
        app.service
            .create(&[Tile::from(square_feature(1))])
            .expect("seed");

        let (status, _body) =
            send(app.router(), "POST", "/tiles/", Some(json!([tile_json(1)]))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[rstest]
    #[tokio::test]
    async fn update_of_missing_tile_is_404(app: App) {
        let (status, body) =
            send(app.router(), "PUT", "/tiles/", Some(json!([tile_json(999)]))).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "tile with id 999 not found"}));
    }

    #[rstest]
    #[tokio::test]
    async fn update_replaces_geometry(app: App) {
        app.service
            .create(&[Tile::from(square_feature(1))])
            .expect("seed");
        let mut replacement = tile_json(7);
        replacement["id"] = json!(1);

        let (status, body) = send(
            app.router(),
            "PUT",
            "/tiles/",
            Some(json!([replacement.clone()])),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([replacement]));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_reports_removed_ids(app: App) {
        app.service
            .create(&[Tile::from(square_feature(2))])
            .expect("seed");

        let (status, body) = send(app.router(), "DELETE", "/tiles/", Some(json!([1, 2, 3]))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"detail": "1 tiles deleted successfully", "deleted_ids": [2]})
        );
    }
}
