//! Observability infrastructure for the forecast service
//!
//! Provides:
//! - Prometheus metrics (request latency, inference latency, artifact reloads)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, register_int_gauge, Encoder, GaugeVec, Histogram, HistogramVec,
    IntCounter, IntCounterVec, IntGauge, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Artifact loads read models from disk, so they get coarser buckets
const LOAD_BUCKETS: &[f64] = &[0.001, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

struct ForecastMetricsInner {
    request_latency_seconds: HistogramVec,
    inference_latency_seconds: Histogram,
    artifact_load_seconds: Histogram,
    artifact_reloads: IntCounter,
    artifact_load_failures: IntCounter,
    predictions: IntCounterVec,
    prediction_errors: IntCounterVec,
    feature_order_size: IntGauge,
    bundle_info: GaugeVec,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            request_latency_seconds: register_histogram_vec!(
                "harvest_forecast_request_latency_seconds",
                "Time spent serving an API request",
                &["endpoint"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_latency_seconds"),

            inference_latency_seconds: register_histogram!(
                "harvest_forecast_inference_latency_seconds",
                "Time spent running model inference for one batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            artifact_load_seconds: register_histogram!(
                "harvest_forecast_artifact_load_seconds",
                "Time spent loading a model artifact bundle",
                LOAD_BUCKETS.to_vec()
            )
            .expect("Failed to register artifact_load_seconds"),

            artifact_reloads: register_int_counter!(
                "harvest_forecast_artifact_reloads_total",
                "Number of successful artifact bundle loads"
            )
            .expect("Failed to register artifact_reloads"),

            artifact_load_failures: register_int_counter!(
                "harvest_forecast_artifact_load_failures_total",
                "Number of failed artifact bundle loads"
            )
            .expect("Failed to register artifact_load_failures"),

            predictions: register_int_counter_vec!(
                "harvest_forecast_predictions_total",
                "Number of predicted rows",
                &["target"]
            )
            .expect("Failed to register predictions"),

            prediction_errors: register_int_counter_vec!(
                "harvest_forecast_prediction_errors_total",
                "Number of failed prediction requests by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors"),

            feature_order_size: register_int_gauge!(
                "harvest_forecast_feature_order_size",
                "Number of features in the active feature order"
            )
            .expect("Failed to register feature_order_size"),

            bundle_info: register_gauge_vec!(
                "harvest_forecast_bundle_info",
                "Information about the active artifact bundle",
                &["fingerprint", "feature_order_source"]
            )
            .expect("Failed to register bundle_info"),
        }
    }
}

/// Forecast metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct ForecastMetrics {
    _private: (),
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForecastMetricsInner {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new)
    }

    pub fn observe_request_latency(&self, endpoint: &str, duration_secs: f64) {
        self.inner()
            .request_latency_seconds
            .with_label_values(&[endpoint])
            .observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    /// Record a successful bundle load
    pub fn record_artifact_load(&self, duration_secs: f64) {
        self.inner().artifact_load_seconds.observe(duration_secs);
        self.inner().artifact_reloads.inc();
    }

    pub fn inc_artifact_load_failures(&self) {
        self.inner().artifact_load_failures.inc();
    }

    /// Count predicted rows for "days" or "yield"
    pub fn inc_predictions(&self, target: &str, rows: u64) {
        self.inner().predictions.with_label_values(&[target]).inc_by(rows);
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner().prediction_errors.with_label_values(&[kind]).inc();
    }

    /// Publish the active bundle's identity
    pub fn set_bundle(&self, fingerprint: &str, feature_order_source: &str, order_size: usize) {
        self.inner().bundle_info.reset();
        self.inner()
            .bundle_info
            .with_label_values(&[fingerprint, feature_order_source])
            .set(1.0);
        self.inner().feature_order_size.set(order_size as i64);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Structured logger for forecast events
///
/// Provides consistent JSON-formatted logging for predictions,
/// artifact reloads and service lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log a served prediction
    pub fn log_prediction(
        &self,
        request_id: &str,
        endpoint: &str,
        rows: usize,
        fingerprint: &str,
        elapsed_ms: u64,
    ) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            request_id = %request_id,
            endpoint = %endpoint,
            rows = rows,
            bundle_fingerprint = %fingerprint,
            elapsed_ms = elapsed_ms,
            "Served prediction"
        );
    }

    /// Log a failed request
    pub fn log_request_error(&self, request_id: &str, endpoint: &str, code: u16, message: &str) {
        if code == crate::error::CODE_SERVER {
            error!(
                event = "request_failed",
                instance = %self.instance,
                request_id = %request_id,
                endpoint = %endpoint,
                code = code,
                message = %message,
                "Request failed"
            );
        } else {
            warn!(
                event = "request_rejected",
                instance = %self.instance,
                request_id = %request_id,
                endpoint = %endpoint,
                code = code,
                message = %message,
                "Request rejected"
            );
        }
    }

    /// Log a single-cycle forecast
    pub fn log_cycle_forecast(
        &self,
        cycle_id: i64,
        predicted_days: i64,
        predicted_yield: f64,
        corrected_yield: f64,
        season_flag: Option<u8>,
    ) {
        info!(
            event = "cycle_forecast",
            instance = %self.instance,
            cycle_id = cycle_id,
            predicted_days = predicted_days,
            predicted_yield = predicted_yield,
            predicted_yield_corrected = corrected_yield,
            season_flag = ?season_flag,
            "Forecast cycle"
        );
    }

    pub fn log_startup(&self, version: &str, host: &str, port: u16) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            host = %host,
            port = port,
            "Harvest forecast service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Harvest forecast service shutting down"
        );
    }
}
