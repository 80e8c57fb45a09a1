//! Single-cycle forecast

use anyhow::{Context, Result};
use forecast_lib::{
    AgronomicFeatureDeriver, ArtifactCache, ArtifactPaths, PartialHarvest, PredictionEngine,
    SnapshotCycleStore, StructuredLogger,
};
use std::path::PathBuf;
use tracing::info;

use crate::output::{round1, CycleForecast};

/// Everything needed to forecast one stored cycle
#[derive(Debug, Clone)]
pub struct PredictArgs {
    pub cycle_id: i64,
    pub data: PathBuf,
    pub paths: ArtifactPaths,
    pub partial: PartialHarvest,
}

/// Derive the cycle's features from the snapshot and run both models
pub fn forecast_cycle(args: &PredictArgs, logger: &StructuredLogger) -> Result<CycleForecast> {
    let store = SnapshotCycleStore::from_path(&args.data)
        .with_context(|| format!("Failed to open cycle data {}", args.data.display()))?;
    info!(
        cycles = store.cycles.len(),
        harvests = store.harvests.len(),
        weather_days = store.weather.len(),
        "Loaded cycle snapshot"
    );

    let derived = AgronomicFeatureDeriver::new().derive_cycle(&store, args.cycle_id)?;

    let cache = ArtifactCache::new(args.paths.clone());
    let bundle = cache.get_bundle()?;
    let engine = PredictionEngine::new().with_required(args.paths.required_features.clone());
    let result = engine.predict(&bundle, &derived, &args.partial)?;

    logger.log_cycle_forecast(
        args.cycle_id,
        result.predicted_days,
        result.predicted_yield,
        result.predicted_yield_corrected,
        result.season_flag.map(|s| s.as_u8()),
    );

    Ok(CycleForecast {
        status: "success",
        cycle_id: args.cycle_id,
        expected_harvest_date: result.expected_harvest_date,
        predicted_growth_days: result.predicted_days,
        predicted_yield: round1(result.predicted_yield),
        predicted_yield_corrected: round1(result.predicted_yield_corrected),
        season_flag: result.season_flag,
        sales_adjust_days: result.business_adjustment_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_lib::ForecastError;
    use std::fs;
    use tempfile::TempDir;

    fn fixture(dir: &TempDir) -> PredictArgs {
        let data = dir.path().join("cycles.json");
        fs::write(
            &data,
            r#"{"cycles": [{"id": 7, "bed_id": 3, "bed_group": "normal",
                "plant_date": "2025-07-01", "harvest_start": "2025-08-25"}]}"#,
        )
        .unwrap();
        let days = dir.path().join("days.json");
        let yield_path = dir.path().join("yield.json");
        fs::write(
            &days,
            r#"{"type": "linear", "feature_names": ["base_growth_days", "season_flag"],
                "coefficients": [1.0, 0.0], "intercept": 2.0}"#,
        )
        .unwrap();
        fs::write(
            &yield_path,
            r#"{"type": "linear", "coefficients": [0.0, 10.0], "intercept": 100.04}"#,
        )
        .unwrap();
        PredictArgs {
            cycle_id: 7,
            data,
            paths: ArtifactPaths {
                days_model: Some(days),
                yield_model: Some(yield_path),
                ..Default::default()
            },
            partial: PartialHarvest::default(),
        }
    }

    #[test]
    fn test_forecast_cycle() {
        let dir = TempDir::new().unwrap();
        let args = fixture(&dir);
        let forecast = forecast_cycle(&args, &StructuredLogger::new("test")).unwrap();

        assert_eq!(forecast.predicted_growth_days, 52);
        assert_eq!(forecast.predicted_yield, 110.0);
        assert_eq!(forecast.sales_adjust_days, Some(5.0));
        assert_eq!(forecast.expected_harvest_date.unwrap().to_string(), "2025-08-20");
    }

    #[test]
    fn test_partial_correction_is_rounded() {
        let dir = TempDir::new().unwrap();
        let mut args = fixture(&dir);
        args.partial = PartialHarvest {
            apply: true,
            partial_yield: Some(30.0),
            partial_ratio: Some(0.5),
        };
        let forecast = forecast_cycle(&args, &StructuredLogger::new("test")).unwrap();
        assert_eq!(forecast.predicted_yield_corrected, 85.0);
    }

    #[test]
    fn test_unknown_cycle() {
        let dir = TempDir::new().unwrap();
        let mut args = fixture(&dir);
        args.cycle_id = 99;
        let err = forecast_cycle(&args, &StructuredLogger::new("test")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ForecastError>(),
            Some(ForecastError::NotFound(99))
        ));
    }
}
