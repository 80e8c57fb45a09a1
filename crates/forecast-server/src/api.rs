//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use forecast_lib::{
    error::{ForecastError, ForecastResult},
    health::{ComponentStatus, HealthRegistry},
    request_id::REQUEST_ID_HEADER,
    AgronomicFeatureDeriver, ArtifactCache, CyclePayload, DualPrediction, FeatureInput,
    ForecastMetrics, ModelArtifactBundle, PartialHarvest, PredictionEngine, PredictionResult,
    RequestIdGenerator, StructuredLogger,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Envelope code for request bodies that cannot be parsed
pub const CODE_MALFORMED: u16 = 422;

/// Shared application state
pub struct AppState {
    pub cache: Arc<ArtifactCache>,
    pub engine: PredictionEngine,
    pub deriver: AgronomicFeatureDeriver,
    pub health_registry: HealthRegistry,
    pub metrics: ForecastMetrics,
    pub logger: StructuredLogger,
    pub ids: RequestIdGenerator,
}

impl AppState {
    pub fn new(
        cache: ArtifactCache,
        engine: PredictionEngine,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cache: Arc::new(cache),
            engine,
            deriver: AgronomicFeatureDeriver::new(),
            health_registry,
            metrics: ForecastMetrics::new(),
            logger,
            ids: RequestIdGenerator::new(),
        }
    }

    /// Fetch the current bundle off the runtime and reflect the outcome in health
    pub async fn bundle(&self) -> ForecastResult<Arc<ModelArtifactBundle>> {
        let cache = self.cache.clone();
        let outcome = tokio::task::spawn_blocking(move || cache.get_bundle())
            .await
            .map_err(|e| ForecastError::Inference(format!("artifact task failed: {}", e)))?;
        self.health_registry.observe_bundle(outcome.as_deref()).await;
        outcome
    }
}

/// Request id resolved for the current request
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Error envelope: `{"ok": false, "error": {"code", "message"}, "request_id"}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: u16,
    message: String,
    request_id: String,
}

impl ApiError {
    pub fn from_forecast(err: &ForecastError, request_id: &str) -> Self {
        Self {
            status: StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            code: err.code(),
            message: err.to_string(),
            request_id: request_id.to_string(),
        }
    }

    pub fn malformed(rejection: &JsonRejection, request_id: &str) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            code: CODE_MALFORMED,
            message: rejection.body_text(),
            request_id: request_id.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "ok": false,
            "error": {"code": self.code, "message": self.message},
            "request_id": self.request_id,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Resolve the request id, expose it to handlers and echo it back
async fn request_id_layer(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let supplied = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok());
    let request_id = state.ids.resolve(supplied);
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[derive(Debug, Deserialize)]
pub struct PredictItem {
    pub features: FeatureInput,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub data: Vec<PredictItem>,
}

impl PredictRequest {
    fn into_inputs(self) -> Vec<FeatureInput> {
        self.data.into_iter().map(|item| item.features).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub ok: bool,
    pub model_path: String,
    pub request_id: String,
    pub predictions: Vec<f64>,
}

#[derive(Debug, Serialize)]
pub struct PredictBothResponse {
    pub ok: bool,
    pub model_path_days: String,
    pub model_path_yield: String,
    pub request_id: String,
    pub predictions: Vec<DualPrediction>,
}

/// Forecast for a cycle described entirely by the request
#[derive(Debug, Deserialize)]
pub struct ForecastRequest {
    pub cycle: CyclePayload,
    #[serde(default)]
    pub partial: PartialHarvest,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub ok: bool,
    pub request_id: String,
    pub forecast: PredictionResult,
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}

/// Log, count and convert a failed request
fn fail(state: &AppState, endpoint: &str, request_id: &str, err: ForecastError) -> ApiError {
    state.metrics.inc_prediction_errors(err.kind());
    let api_error = ApiError::from_forecast(&err, request_id);
    state
        .logger
        .log_request_error(request_id, endpoint, api_error.code, &api_error.message);
    api_error
}

fn reject(state: &AppState, endpoint: &str, request_id: &str, rejection: JsonRejection) -> ApiError {
    state.metrics.inc_prediction_errors("malformed");
    let api_error = ApiError::malformed(&rejection, request_id);
    state
        .logger
        .log_request_error(request_id, endpoint, api_error.code, &api_error.message);
    api_error
}

async fn run_blocking<T, F>(f: F) -> ForecastResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ForecastResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ForecastError::Inference(format!("prediction task failed: {}", e)))?
}

/// Single-model (days) batch prediction
async fn predict(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    const ENDPOINT: &str = "predict";
    let start = Instant::now();
    let Json(req) = body.map_err(|r| reject(&state, ENDPOINT, &request_id, r))?;
    let inputs = req.into_inputs();
    let rows = inputs.len();
    debug!(request_id = %request_id, records = rows, "/api/predict called");

    let bundle = state
        .bundle()
        .await
        .map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let engine = state.engine.clone();
    let task_bundle = bundle.clone();
    let predictions = run_blocking(move || engine.predict_days(&task_bundle, &inputs)).await;
    state
        .health_registry
        .observe_inference(predictions.as_ref().map(|_| ()))
        .await;
    let predictions = predictions.map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let elapsed = start.elapsed();
    state.metrics.observe_request_latency(ENDPOINT, elapsed.as_secs_f64());
    state.logger.log_prediction(
        &request_id,
        ENDPOINT,
        rows,
        &bundle.fingerprint,
        elapsed.as_millis() as u64,
    );

    Ok(Json(PredictResponse {
        ok: true,
        model_path: display_path(&bundle.days_model_path),
        request_id,
        predictions,
    }))
}

/// Dual-model (days and yield) batch prediction
async fn predict_both(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictBothResponse>, ApiError> {
    const ENDPOINT: &str = "predict_both";
    let start = Instant::now();
    let Json(req) = body.map_err(|r| reject(&state, ENDPOINT, &request_id, r))?;
    let inputs = req.into_inputs();
    let rows = inputs.len();
    debug!(request_id = %request_id, records = rows, "/api/predict_both called");

    let bundle = state
        .bundle()
        .await
        .map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let engine = state.engine.clone();
    let task_bundle = bundle.clone();
    let predictions = run_blocking(move || engine.predict_both(&task_bundle, &inputs)).await;
    state
        .health_registry
        .observe_inference(predictions.as_ref().map(|_| ()))
        .await;
    let predictions = predictions.map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let elapsed = start.elapsed();
    state.metrics.observe_request_latency(ENDPOINT, elapsed.as_secs_f64());
    state.logger.log_prediction(
        &request_id,
        ENDPOINT,
        rows,
        &bundle.fingerprint,
        elapsed.as_millis() as u64,
    );

    Ok(Json(PredictBothResponse {
        ok: true,
        model_path_days: display_path(&bundle.days_model_path),
        model_path_yield: display_path(&bundle.yield_model_path),
        request_id,
        predictions,
    }))
}

/// Derive features from a cycle payload and forecast it
async fn forecast(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    body: Result<Json<ForecastRequest>, JsonRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    const ENDPOINT: &str = "forecast";
    let start = Instant::now();
    let Json(req) = body.map_err(|r| reject(&state, ENDPOINT, &request_id, r))?;

    let derived = state
        .deriver
        .derive_payload(&req.cycle)
        .map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let bundle = state
        .bundle()
        .await
        .map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let engine = state.engine.clone();
    let task_bundle = bundle.clone();
    let partial = req.partial;
    let result = run_blocking(move || engine.predict(&task_bundle, &derived, &partial)).await;
    state
        .health_registry
        .observe_inference(result.as_ref().map(|_| ()))
        .await;
    let result = result.map_err(|e| fail(&state, ENDPOINT, &request_id, e))?;

    let elapsed = start.elapsed();
    state.metrics.observe_request_latency(ENDPOINT, elapsed.as_secs_f64());
    state
        .logger
        .log_prediction(&request_id, ENDPOINT, 1, &bundle.fingerprint, elapsed.as_millis() as u64);

    Ok(Json(ForecastResponse {
        ok: true,
        request_id,
        forecast: result,
    }))
}

/// Resolved feature order of the current bundle
async fn feature_meta(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> Result<impl IntoResponse, ApiError> {
    let bundle = state
        .bundle()
        .await
        .map_err(|e| fail(&state, "feature_meta", &request_id, e))?;
    let order = bundle.feature_order().unwrap_or_default();
    Ok(Json(json!({
        "ok": true,
        "feature_order": order,
        "feature_order_size": order.len(),
    })))
}

/// Artifact health; load failures are reported in the body, not the status
async fn api_health(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
) -> impl IntoResponse {
    match state.bundle().await {
        Ok(bundle) => Json(json!({
            "ok": true,
            "model_path_days": display_path(&bundle.days_model_path),
            "model_path_yield": display_path(&bundle.yield_model_path),
            "request_id": request_id,
            "feature_order_size": bundle.feature_order_size(),
            "preprocessor": bundle.preprocessor.is_some(),
        })),
        Err(e) => {
            state
                .logger
                .log_request_error(&request_id, "health", e.code(), &e.to_string());
            Json(json!({
                "ok": false,
                "error": {"code": e.code(), "message": "model_load_failed"},
                "request_id": request_id,
            }))
        }
    }
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serving
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            buffer,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/predict", post(predict))
        .route("/predict_both", post(predict_both))
        .route("/forecast", post(forecast))
        .route("/feature_meta", get(feature_meta))
        .route("/health", get(api_health));

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), request_id_layer))
        .with_state(state)
}

/// Start the API server
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
