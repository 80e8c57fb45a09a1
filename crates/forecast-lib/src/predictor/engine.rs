//! Dual-model prediction over a loaded artifact bundle

use super::{FeatureMatrix, FeatureVectorBuilder, Regressor};
use crate::artifacts::ModelArtifactBundle;
use crate::error::{ForecastError, ForecastResult};
use crate::models::{
    DualPrediction, FeatureInput, FeatureRecord, PartialHarvest, PredictionDiagnostics,
    PredictionResult, SeasonFlag,
};
use crate::observability::ForecastMetrics;
use chrono::{Duration, NaiveDate};
use std::time::Instant;
use tract_onnx::prelude::tract_ndarray::{Array2, ArrayView2};
use tracing::{debug, error};

/// Weight of the model's yield when blending in a partial-harvest estimate
pub const PARTIAL_BLEND_ALPHA: f64 = 0.5;

/// A named feature record plus the context needed to finish a forecast
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFeatures {
    pub record: FeatureRecord,
    pub plant_date: Option<NaiveDate>,
    /// Harvest date already known before predicting
    pub expected_harvest: Option<NaiveDate>,
    pub season_flag: Option<SeasonFlag>,
    pub business_adjustment_days: Option<f64>,
}

/// Blend a partial-harvest extrapolation into a model yield
///
/// Returns the corrected yield and the extrapolated total when the
/// correction applies.
pub fn correct_partial_yield(model_yield: f64, partial: &PartialHarvest, alpha: f64) -> (f64, Option<f64>) {
    if !partial.apply {
        return (model_yield, None);
    }
    match (partial.partial_yield, partial.partial_ratio) {
        (Some(partial_yield), Some(ratio)) if ratio != 0.0 => {
            let estimate = partial_yield / ratio;
            (alpha * model_yield + (1.0 - alpha) * estimate, Some(estimate))
        }
        _ => (model_yield, None),
    }
}

/// Runs the preprocessing transform and both regressors
#[derive(Clone)]
pub struct PredictionEngine {
    required: Vec<String>,
    metrics: ForecastMetrics,
}

impl Default for PredictionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionEngine {
    pub fn new() -> Self {
        Self {
            required: Vec::new(),
            metrics: ForecastMetrics::new(),
        }
    }

    /// Feature keys every named input must carry
    pub fn with_required(mut self, required: Vec<String>) -> Self {
        self.required = required;
        self
    }

    fn builder<'a>(&'a self, bundle: &'a ModelArtifactBundle) -> FeatureVectorBuilder<'a> {
        FeatureVectorBuilder::new(bundle.feature_order())
            .with_required(&self.required)
    }

    /// Predict growth days for a batch of raw inputs
    pub fn predict_days(
        &self,
        bundle: &ModelArtifactBundle,
        inputs: &[FeatureInput],
    ) -> ForecastResult<Vec<f64>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.builder(bundle).build(inputs)?;
        let (x, _) = self.preprocess(bundle, x)?;
        self.run(bundle.days_model.as_ref(), "days", x.view())
    }

    /// Predict growth days and yield for a batch of raw inputs
    pub fn predict_both(
        &self,
        bundle: &ModelArtifactBundle,
        inputs: &[FeatureInput],
    ) -> ForecastResult<Vec<DualPrediction>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.builder(bundle).build(inputs)?;
        let (x, _) = self.preprocess(bundle, x)?;
        let days = self.run(bundle.days_model.as_ref(), "days", x.view())?;
        let yields = self.run(bundle.yield_model.as_ref(), "yield", x.view())?;
        Ok(days
            .into_iter()
            .zip(yields)
            .map(|(days, yield_kg)| DualPrediction { days, yield_kg })
            .collect())
    }

    /// Forecast a single derived record
    pub fn predict(
        &self,
        bundle: &ModelArtifactBundle,
        derived: &DerivedFeatures,
        partial: &PartialHarvest,
    ) -> ForecastResult<PredictionResult> {
        let (row, filled_features) = self.builder(bundle).build_record(&derived.record)?;
        let width = row.len();
        let x = Array2::from_shape_vec((1, width), row)
            .map_err(|e| ForecastError::validation(format!("Failed to assemble feature row: {}", e)))?;
        let (x, preprocessed) = self.preprocess(bundle, x)?;

        let days = first(self.run(bundle.days_model.as_ref(), "days", x.view())?)?;
        let model_yield = first(self.run(bundle.yield_model.as_ref(), "yield", x.view())?)?;

        let predicted_days = round_days(days)?;
        let (corrected, partial_estimate) = correct_partial_yield(model_yield, partial, PARTIAL_BLEND_ALPHA);

        // Left undefined when the offset falls outside the calendar
        let expected_harvest_date = derived.expected_harvest.or_else(|| {
            derived.plant_date.and_then(|p| {
                Duration::try_days(predicted_days).and_then(|d| p.checked_add_signed(d))
            })
        });

        debug!(
            predicted_days = predicted_days,
            predicted_yield = model_yield,
            filled = filled_features.len(),
            "Forecast computed"
        );

        Ok(PredictionResult {
            predicted_days,
            predicted_yield: model_yield,
            predicted_yield_corrected: corrected,
            season_flag: derived.season_flag,
            business_adjustment_days: derived.business_adjustment_days,
            expected_harvest_date,
            diagnostics: PredictionDiagnostics {
                bundle_fingerprint: bundle.fingerprint.clone(),
                feature_order_source: bundle.feature_order_source.map(|s| s.to_string()),
                preprocessed,
                filled_features,
                partial_estimate,
            },
        })
    }

    fn preprocess(
        &self,
        bundle: &ModelArtifactBundle,
        x: FeatureMatrix,
    ) -> ForecastResult<(FeatureMatrix, bool)> {
        let Some(preprocessor) = &bundle.preprocessor else {
            return Ok((x, false));
        };
        let order = bundle.feature_order().ok_or_else(|| {
            ForecastError::config("Preprocessor is configured but no feature order could be resolved")
        })?;
        let transformed = preprocessor.transform(x.view(), order).map_err(|e| {
            error!(error = %format!("{:#}", e), "Preprocessor transform failed");
            ForecastError::Inference("Failed to preprocess features".to_string())
        })?;
        Ok((transformed, true))
    }

    fn run(&self, model: &dyn Regressor, target: &str, x: ArrayView2<'_, f64>) -> ForecastResult<Vec<f64>> {
        let start = Instant::now();
        let out = model.predict(x).map_err(|e| {
            error!(
                target_model = %target,
                model_kind = model.kind(),
                error = %format!("{:#}", e),
                "Model inference failed"
            );
            ForecastError::Inference(format!("{} model failed to predict", target))
        })?;
        if out.len() != x.nrows() {
            error!(
                target_model = %target,
                expected = x.nrows(),
                actual = out.len(),
                "Model returned wrong number of predictions"
            );
            return Err(ForecastError::Inference(format!(
                "{} model returned an unexpected number of predictions",
                target
            )));
        }
        self.metrics.observe_inference_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_predictions(target, out.len() as u64);
        Ok(out)
    }
}

/// Round a days prediction half away from zero
fn round_days(days: f64) -> ForecastResult<i64> {
    let rounded = days.round();
    if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
        error!(predicted_days = days, "Days model returned an out-of-range value");
        return Err(ForecastError::Inference(
            "days model returned an out-of-range prediction".to_string(),
        ));
    }
    Ok(rounded as i64)
}

fn first(values: Vec<f64>) -> ForecastResult<f64> {
    values
        .into_iter()
        .next()
        .ok_or_else(|| ForecastError::Inference("Model returned no prediction".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::FeatureOrderSource;
    use crate::predictor::{JsonRegressor, Preprocessor};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn linear(coefficients: &[f64], intercept: f64) -> Arc<dyn Regressor> {
        let json = json!({"type": "linear", "coefficients": coefficients, "intercept": intercept});
        Arc::new(JsonRegressor::from_json(&json.to_string()).unwrap())
    }

    /// A model that ignores its input and always returns one value
    struct ShortModel;

    impl Regressor for ShortModel {
        fn predict(&self, _x: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
            Ok(vec![1.0])
        }

        fn kind(&self) -> &'static str {
            "short"
        }
    }

    struct ConstantModel(f64);

    impl Regressor for ConstantModel {
        fn predict(&self, x: ArrayView2<'_, f64>) -> anyhow::Result<Vec<f64>> {
            Ok(vec![self.0; x.nrows()])
        }

        fn kind(&self) -> &'static str {
            "constant"
        }
    }

    fn bundle(order: Option<&[&str]>) -> ModelArtifactBundle {
        ModelArtifactBundle {
            days_model: linear(&[1.0, 0.0], 0.0),
            yield_model: linear(&[0.0, 10.0], 5.0),
            preprocessor: None,
            preprocessor_error: None,
            feature_order: order.map(|o| o.iter().map(|s| s.to_string()).collect()),
            feature_order_source: order.map(|_| FeatureOrderSource::Meta),
            days_model_path: PathBuf::from("days.json"),
            yield_model_path: PathBuf::from("yield.json"),
            signature: "sig".to_string(),
            fingerprint: "abc".to_string(),
            loaded_at: chrono::Utc::now(),
        }
    }

    fn inputs(values: serde_json::Value) -> Vec<FeatureInput> {
        serde_json::from_value(values).unwrap()
    }

    fn derived(base: f64, flag: f64) -> DerivedFeatures {
        let mut record = FeatureRecord::new();
        record.set("base_growth_days", Some(base));
        record.set("season_flag", Some(flag));
        DerivedFeatures {
            record,
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_correction_blends() {
        let partial = PartialHarvest {
            apply: true,
            partial_yield: Some(30.0),
            partial_ratio: Some(0.5),
        };
        let (corrected, estimate) = correct_partial_yield(100.0, &partial, PARTIAL_BLEND_ALPHA);
        assert!((corrected - 80.0).abs() < 1e-9);
        assert_eq!(estimate, Some(60.0));
    }

    #[test]
    fn test_partial_correction_skipped() {
        let zero_ratio = PartialHarvest {
            apply: true,
            partial_yield: Some(30.0),
            partial_ratio: Some(0.0),
        };
        assert_eq!(correct_partial_yield(100.0, &zero_ratio, 0.5), (100.0, None));

        let not_applied = PartialHarvest {
            apply: false,
            partial_yield: Some(30.0),
            partial_ratio: Some(0.5),
        };
        assert_eq!(correct_partial_yield(100.0, &not_applied, 0.5), (100.0, None));

        let no_yield = PartialHarvest {
            apply: true,
            partial_yield: None,
            partial_ratio: Some(0.5),
        };
        assert_eq!(correct_partial_yield(100.0, &no_yield, 0.5), (100.0, None));
    }

    #[test]
    fn test_predict_days_named_batch() {
        let bundle = bundle(Some(&["a", "b"]));
        let engine = PredictionEngine::new();
        let out = engine
            .predict_days(&bundle, &inputs(json!([{"a": 3, "b": 1}, {"a": 7}])))
            .unwrap();
        assert_eq!(out, vec![3.0, 7.0]);
    }

    #[test]
    fn test_predict_both_positional() {
        let bundle = bundle(None);
        let out = PredictionEngine::new()
            .predict_both(&bundle, &inputs(json!([[2, 1], [4, 0]])))
            .unwrap();
        assert_eq!(out[0], DualPrediction { days: 2.0, yield_kg: 15.0 });
        assert_eq!(out[1], DualPrediction { days: 4.0, yield_kg: 5.0 });
    }

    #[test]
    fn test_validation_happens_before_inference() {
        let bundle = bundle(Some(&["a", "b"]));
        let engine = PredictionEngine::new().with_required(vec!["b".to_string()]);
        let err = engine.predict_days(&bundle, &inputs(json!([{"a": 1}]))).unwrap_err();
        assert!(matches!(err, ForecastError::Validation(_)));
    }

    #[test]
    fn test_empty_batch() {
        let bundle = bundle(Some(&["a", "b"]));
        assert!(PredictionEngine::new().predict_both(&bundle, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_row_count_mismatch_is_inference_error() {
        let mut bundle = bundle(None);
        bundle.days_model = Arc::new(ShortModel);
        let err = PredictionEngine::new()
            .predict_days(&bundle, &inputs(json!([[1, 2], [3, 4]])))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Inference(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_preprocessor_requires_order() {
        let mut bundle = bundle(None);
        bundle.preprocessor = Some(
            Preprocessor::from_json(r#"{"transform": {"type": "standard_scaler", "mean": [0, 0], "scale": [1, 1]}}"#)
                .unwrap(),
        );
        let err = PredictionEngine::new()
            .predict_days(&bundle, &inputs(json!([[1, 2]])))
            .unwrap_err();
        assert!(matches!(err, ForecastError::Config(_)));
    }

    #[test]
    fn test_preprocessor_applied() {
        let mut bundle = bundle(Some(&["a", "b"]));
        bundle.preprocessor = Some(
            Preprocessor::from_json(r#"{"transform": {"type": "standard_scaler", "mean": [10, 0], "scale": [2, 1]}}"#)
                .unwrap(),
        );
        let out = PredictionEngine::new()
            .predict_days(&bundle, &inputs(json!([{"a": 14, "b": 0}])))
            .unwrap();
        assert_eq!(out, vec![2.0]);
    }

    #[test]
    fn test_predict_rounds_and_dates() {
        let bundle = bundle(Some(&["base_growth_days", "season_flag"]));
        let mut features = derived(49.5, 1.0);
        features.plant_date = NaiveDate::from_ymd_opt(2025, 7, 1);
        features.season_flag = Some(SeasonFlag::Summer);

        let result = PredictionEngine::new()
            .predict(&bundle, &features, &PartialHarvest::default())
            .unwrap();
        assert_eq!(result.predicted_days, 50);
        assert_eq!(result.predicted_yield, 15.0);
        assert_eq!(result.predicted_yield_corrected, 15.0);
        assert_eq!(result.expected_harvest_date, NaiveDate::from_ymd_opt(2025, 8, 20));
        assert_eq!(result.diagnostics.bundle_fingerprint, "abc");
        assert_eq!(result.diagnostics.feature_order_source.as_deref(), Some("meta"));
    }

    #[test]
    fn test_predict_keeps_known_harvest_date() {
        let bundle = bundle(Some(&["base_growth_days", "season_flag"]));
        let mut features = derived(50.0, 1.0);
        features.plant_date = NaiveDate::from_ymd_opt(2025, 7, 1);
        features.expected_harvest = NaiveDate::from_ymd_opt(2025, 8, 25);

        let result = PredictionEngine::new()
            .predict(&bundle, &features, &PartialHarvest::default())
            .unwrap();
        assert_eq!(result.expected_harvest_date, NaiveDate::from_ymd_opt(2025, 8, 25));
    }

    #[test]
    fn test_predict_rounds_half_away_from_zero() {
        let bundle = bundle(Some(&["base_growth_days", "season_flag"]));
        let result = PredictionEngine::new()
            .predict(&bundle, &derived(-2.5, 0.0), &PartialHarvest::default())
            .unwrap();
        assert_eq!(result.predicted_days, -3);
        assert!(result.expected_harvest_date.is_none());
    }

    #[test]
    fn test_predict_rejects_non_finite_days() {
        for value in [f64::NAN, f64::INFINITY] {
            let mut bundle = bundle(Some(&["base_growth_days", "season_flag"]));
            bundle.days_model = Arc::new(ConstantModel(value));
            let err = PredictionEngine::new()
                .predict(&bundle, &derived(50.0, 1.0), &PartialHarvest::default())
                .unwrap_err();
            assert!(matches!(err, ForecastError::Inference(_)));
        }
    }

    #[test]
    fn test_predict_huge_days_leaves_date_undefined() {
        let bundle = bundle(Some(&["base_growth_days", "season_flag"]));
        let mut features = derived(1e12, 1.0);
        features.plant_date = NaiveDate::from_ymd_opt(2025, 7, 1);

        let result = PredictionEngine::new()
            .predict(&bundle, &features, &PartialHarvest::default())
            .unwrap();
        assert_eq!(result.predicted_days, 1_000_000_000_000);
        assert!(result.expected_harvest_date.is_none());

        let err = PredictionEngine::new()
            .predict(&bundle, &derived(1e300, 1.0), &PartialHarvest::default())
            .unwrap_err();
        assert!(matches!(err, ForecastError::Inference(_)));
    }

    #[test]
    fn test_predict_reports_filled_features() {
        let bundle = bundle(Some(&["base_growth_days", "season_flag", "temp_avg"]));
        let engine = PredictionEngine::new();
        let mut bundle = bundle;
        bundle.days_model = linear(&[1.0, 0.0, 0.0], 0.0);
        bundle.yield_model = linear(&[0.0, 0.0, 0.0], 1.0);

        let result = engine
            .predict(&bundle, &derived(50.0, 1.0), &PartialHarvest::default())
            .unwrap();
        assert_eq!(result.diagnostics.filled_features, vec!["temp_avg".to_string()]);
    }
}
