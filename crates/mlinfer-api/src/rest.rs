//! REST API handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use mlinfer_core::MlinferError;
use mlinfer_runtime::{Predictor, Row};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};
use utoipa::{OpenApi, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;
use utoipa_scalar::{Scalar, Servable};

use crate::openapi::{ApiDoc, RowSchema, DOCS_PATH, SPEC_PATH};

/// What the server knows about its model
#[derive(Clone)]
pub enum ModelState {
    /// Model loaded and ready to score
    Loaded(Arc<dyn Predictor>),
    /// Model could not be loaded, with the reason
    Failed(String),
}

impl ModelState {
    fn model(&self) -> Result<&Arc<dyn Predictor>, ApiError> {
        match self {
            ModelState::Loaded(model) => Ok(model),
            ModelState::Failed(reason) => Err(ApiError::from(MlinferError::ModelNotLoaded(
                reason.clone(),
            ))),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub model: ModelState,
}

/// Create the API router, with the OpenAPI document and its reference UI
pub fn create_router(model: ModelState) -> Router {
    let state = Arc::new(AppState { model });

    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .routes(routes!(status))
        .routes(routes!(model_config))
        .routes(routes!(predict))
        .routes(routes!(invocations))
        .with_state(state)
        .split_for_parts();

    let document = api.clone();

    router
        .route(SPEC_PATH, get(move || async move { Json(document) }))
        .merge(Scalar::with_url(DOCS_PATH, api))
        .layer(TraceLayer::new_for_http())
}

/// Error body, `{"detail": "..."}`
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl From<MlinferError> for ApiError {
    fn from(err: MlinferError) -> Self {
        let status = match err {
            MlinferError::ModelNotLoaded(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorDetail { detail: self.detail })).into_response()
    }
}

/// Status response
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub ok: bool,
}

/// Report whether the model is loaded
#[utoipa::path(
    get,
    path = "/_status",
    responses(
        (status = 200, description = "Model loaded", body = StatusResponse),
        (status = 404, description = "Model not loaded", body = ErrorDetail),
    ),
)]
async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    state.model.model()?;
    Ok(Json(StatusResponse { ok: true }))
}

/// Return the model descriptor
#[utoipa::path(
    get,
    path = "/_config",
    responses(
        (status = 200, description = "The MLmodel mapping"),
        (status = 404, description = "Model not loaded", body = ErrorDetail),
    ),
)]
async fn model_config(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let model = state.model.model()?;
    Ok(Json(model.descriptor().to_value()))
}

/// Score a JSON array of row objects
#[utoipa::path(
    post,
    path = "/predict",
    request_body = Vec<RowSchema>,
    responses(
        (status = 200, description = "One result row per input row", body = Vec<RowSchema>),
        (status = 404, description = "Model not loaded", body = ErrorDetail),
        (status = 415, description = "Body is not JSON", body = ErrorDetail),
        (status = 422, description = "Body is not an array of rows", body = ErrorDetail),
        (status = 500, description = "Prediction failed", body = ErrorDetail),
    ),
)]
async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<Row>>, ApiError> {
    score(&state, &headers, &body).await
}

/// Score a JSON array of row objects, under the scoring server's route name
#[utoipa::path(
    post,
    path = "/invocations",
    request_body = Vec<RowSchema>,
    responses(
        (status = 200, description = "One result row per input row", body = Vec<RowSchema>),
        (status = 404, description = "Model not loaded", body = ErrorDetail),
        (status = 415, description = "Body is not JSON", body = ErrorDetail),
        (status = 422, description = "Body is not an array of rows", body = ErrorDetail),
        (status = 500, description = "Prediction failed", body = ErrorDetail),
    ),
)]
async fn invocations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<Row>>, ApiError> {
    score(&state, &headers, &body).await
}

async fn score(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<Vec<Row>>, ApiError> {
    let model = state.model.model()?;
    let rows = parse_rows(headers, body)?;

    debug!(rows = rows.len(), "Predicting");

    let predictions = model.predict(rows).await.map_err(|e| {
        error!(error = %e, "Prediction failed");
        ApiError::from(e)
    })?;

    Ok(Json(predictions))
}

/// Parse the request rows. A missing `Content-Type` is read as JSON.
fn parse_rows(headers: &HeaderMap, body: &[u8]) -> Result<Vec<Row>, ApiError> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let is_json = content_type
            .to_str()
            .ok()
            .and_then(|value| value.split(';').next())
            .map(|mime| {
                let mime = mime.trim();
                mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
            })
            .unwrap_or(false);

        if !is_json {
            return Err(ApiError {
                status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
                detail: "Expected request with `Content-Type: application/json`".to_string(),
            });
        }
    }

    let Json(rows) = Json::<Vec<Row>>::from_bytes(body)?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use mlinfer_core::{MlinferResult, ModelDescriptor};
    use serde_json::json;
    use tower::ServiceExt;

    /// Adds a `prediction` column equal to `x + 1`
    struct PlusOne {
        descriptor: ModelDescriptor,
    }

    impl PlusOne {
        fn new() -> Self {
            let descriptor = ModelDescriptor::from_yaml_str(
                "artifact_path: model\nflavors:\n  python_function:\n    loader_module: mlflow.sklearn\n",
            )
            .unwrap();
            Self { descriptor }
        }
    }

    #[async_trait]
    impl Predictor for PlusOne {
        fn descriptor(&self) -> &ModelDescriptor {
            &self.descriptor
        }

        async fn predict(&self, rows: Vec<Row>) -> MlinferResult<Vec<Row>> {
            rows.into_iter()
                .map(|row| -> MlinferResult<Row> {
                    let x = row
                        .get("x")
                        .and_then(Value::as_f64)
                        .ok_or_else(|| MlinferError::Predict("missing column x".to_string()))?;
                    Ok(Row::from_iter([("prediction".to_string(), json!(x + 1.0))]))
                })
                .collect()
        }
    }

    fn loaded() -> Router {
        create_router(ModelState::Loaded(Arc::new(PlusOne::new())))
    }

    fn failed() -> Router {
        create_router(ModelState::Failed("MODEL_URI is not set".to_string()))
    }

    async fn send(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_status_before_load() {
        let (status, body) = send(failed(), Method::GET, "/_status", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Model not initialized: MODEL_URI is not set");
    }

    #[tokio::test]
    async fn test_status_after_load() {
        let (status, body) = send(loaded(), Method::GET, "/_status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_config() {
        let (status, body) = send(loaded(), Method::GET, "/_config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["artifact_path"], "model");
        assert_eq!(
            body["flavors"]["python_function"]["loader_module"],
            "mlflow.sklearn"
        );

        let (status, _) = send(failed(), Method::GET, "/_config", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_predict_keeps_row_count() {
        for route in ["/predict", "/invocations"] {
            let rows = json!([{"x": 1.0}, {"x": 2.0}, {"x": 3.5}]);
            let (status, body) = send(loaded(), Method::POST, route, Some(rows)).await;

            assert_eq!(status, StatusCode::OK);
            let predictions = body.as_array().unwrap();
            assert_eq!(predictions.len(), 3);
            assert_eq!(predictions[2]["prediction"], json!(4.5));
        }
    }

    #[tokio::test]
    async fn test_predict_empty_batch() {
        let (status, body) = send(loaded(), Method::POST, "/predict", Some(json!([]))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn test_predict_rejects_non_rows() {
        let (status, body) =
            send(loaded(), Method::POST, "/predict", Some(json!({"x": 1.0}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_predict_model_error() {
        let (status, body) =
            send(loaded(), Method::POST, "/predict", Some(json!([{"y": 1}]))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Prediction error: missing column x");
    }

    #[tokio::test]
    async fn test_predict_without_model() {
        let (status, _) =
            send(failed(), Method::POST, "/predict", Some(json!([{"x": 1.0}]))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_predict_without_content_type() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .body(Body::from(r#"[{"x": 1.0}]"#))
            .unwrap();

        let response = loaded().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!([{"prediction": 2.0}]));
    }

    #[tokio::test]
    async fn test_predict_rejects_other_content_types() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/invocations")
            .header(header::CONTENT_TYPE, "text/csv")
            .body(Body::from("x\n1.0\n"))
            .unwrap();

        let response = loaded().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_parse_rows_content_types() {
        let body = br#"[{"x": 1}]"#;
        let mut headers = HeaderMap::new();
        assert_eq!(parse_rows(&headers, body).unwrap().len(), 1);

        headers.insert(
            header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );
        assert_eq!(parse_rows(&headers, body).unwrap().len(), 1);

        headers.insert(header::CONTENT_TYPE, "application/vnd.api+json".parse().unwrap());
        assert_eq!(parse_rows(&headers, body).unwrap().len(), 1);

        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        let err = parse_rows(&headers, body).unwrap_err();
        assert_eq!(err.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_openapi_document_lists_routes() {
        let (status, body) = send(failed(), Method::GET, "/api/spec.json", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["info"]["title"], "mlinfer");
        assert!(body["paths"]["/_status"]["get"].is_object());
        assert!(body["paths"]["/_config"]["get"].is_object());
        assert!(body["paths"]["/predict"]["post"]["requestBody"].is_object());
        assert!(body["paths"]["/invocations"]["post"]["requestBody"].is_object());
    }

    #[tokio::test]
    async fn test_api_reference_page() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/doc")
            .body(Body::empty())
            .unwrap();

        let response = failed().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }
}
