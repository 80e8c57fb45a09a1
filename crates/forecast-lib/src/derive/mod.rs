//! Agronomic feature derivation
//!
//! Builds named feature records from stored cycle history (the cycle path)
//! or from a request payload (the request path). Values that cannot be
//! derived stay undefined; they are never replaced with zero here.

mod adjustment;
mod aggregate;

pub use adjustment::{business_adjustment_days, iso_week_wednesday, AdjustmentInputs};
pub use aggregate::{
    difference, reference_days, reference_yield, weighted_average, WeatherAggregates,
};

use crate::error::{ForecastError, ForecastResult};
use crate::models::{Cycle, CycleReference, CyclePayload, FeatureRecord, SeasonFlag};
use crate::predictor::DerivedFeatures;
use crate::store::CycleStore;
use chrono::{Datelike, Duration, NaiveDate};
use tracing::debug;

/// Keys produced by the cycle path, in their canonical training order
pub const CYCLE_FEATURES: [&str; 15] = [
    "base_growth_days",
    "sales_adjust_days",
    "similar_bed_avg_yield",
    "similar_bed_avg_days",
    "prev_year_yield",
    "prev_year_days",
    "yield_diff_prev",
    "days_diff_prev",
    "temp_avg",
    "temp_max",
    "temp_min",
    "temp_std",
    "temp_range_avg",
    "temp_range_std",
    "season_flag",
];

/// Keys produced by the request path
pub const PAYLOAD_FEATURES: [&str; 10] = [
    "nursery_days",
    "transplant_month",
    "group_normal",
    "area_m2",
    "harvest_partial_ratio",
    "days_since_transplant",
    "similar_bed_avg_yield",
    "similar_bed_avg_days",
    "sales_adjust_days",
    "season_flag",
];

/// Group labels counted as the normal bed group
const NORMAL_GROUP_LABELS: [&str; 2] = ["normal", "通常"];

/// Season of a planting date
pub fn season_flag(plant_date: NaiveDate) -> SeasonFlag {
    SeasonFlag::from_date(plant_date)
}

/// Mean growth days over the season's harvested history, or the season's
/// fallback when there is none
///
/// The cycle being forecast is never part of its own history.
pub fn baseline_growth_days(season: SeasonFlag, history: &[i64]) -> f64 {
    if history.is_empty() {
        season.default_growth_days()
    } else {
        history.iter().sum::<i64>() as f64 / history.len() as f64
    }
}

/// Derives features for stored cycles and request payloads
#[derive(Debug, Clone)]
pub struct AgronomicFeatureDeriver {
    /// Half-width of the planting window for similar beds
    similar_window_days: i64,
    /// Planting window for the prior year, as days before this planting
    prior_year_days: (i64, i64),
}

impl Default for AgronomicFeatureDeriver {
    fn default() -> Self {
        Self {
            similar_window_days: 7,
            prior_year_days: (370, 360),
        }
    }
}

impl AgronomicFeatureDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the feature record of a stored cycle
    pub fn derive_cycle(&self, store: &dyn CycleStore, cycle_id: i64) -> ForecastResult<DerivedFeatures> {
        let cycle = store.cycle(cycle_id)?.ok_or(ForecastError::NotFound(cycle_id))?;
        let plant = cycle.plant_date;
        let season = cycle.season_flag();

        let history: Vec<i64> = store
            .harvested_cycles(season)?
            .iter()
            .filter(|c| c.id != cycle.id)
            .filter_map(Cycle::growth_days)
            .collect();
        let base_growth_days = baseline_growth_days(season, &history);
        let expected_harvest = plant + Duration::days(base_growth_days.floor() as i64);

        let window = Duration::days(self.similar_window_days);
        let similar: Vec<CycleReference> = store
            .group_cycles(&cycle.bed_group, plant - window, plant + window)?
            .iter()
            .filter(|c| c.id != cycle.id)
            .map(|c| self.reference(store, c))
            .collect::<ForecastResult<_>>()?;

        let (earliest, latest) = self.prior_year_days;
        let prior: Vec<CycleReference> = store
            .group_cycles(
                &cycle.bed_group,
                plant - Duration::days(earliest),
                plant - Duration::days(latest),
            )?
            .iter()
            .map(|c| self.reference(store, c))
            .collect::<ForecastResult<_>>()?;

        let similar_yield = reference_yield(&similar);
        let similar_days = reference_days(&similar);
        let prev_yield = reference_yield(&prior);
        let prev_days = reference_days(&prior);

        let weather_end = cycle.harvest_start.unwrap_or(expected_harvest);
        let weather = WeatherAggregates::from_days(&store.weather(plant, weather_end)?);

        let adjustment = business_adjustment_days(&AdjustmentInputs {
            transplant: Some(plant),
            baseline_days: Some(base_growth_days),
            actual_harvest: cycle.harvest_start,
            ..Default::default()
        });

        let mut record = FeatureRecord::new();
        record.set("base_growth_days", Some(base_growth_days));
        record.set("sales_adjust_days", adjustment);
        record.set("similar_bed_avg_yield", similar_yield);
        record.set("similar_bed_avg_days", similar_days);
        record.set("prev_year_yield", prev_yield);
        record.set("prev_year_days", prev_days);
        record.set("yield_diff_prev", difference(similar_yield, prev_yield));
        record.set("days_diff_prev", difference(similar_days, prev_days));
        record.set("temp_avg", weather.temp_avg);
        record.set("temp_max", weather.temp_max);
        record.set("temp_min", weather.temp_min);
        record.set("temp_std", weather.temp_std);
        record.set("temp_range_avg", weather.temp_range_avg);
        record.set("temp_range_std", weather.temp_range_std);
        record.set("season_flag", Some(season.as_u8() as f64));

        debug!(
            cycle_id = cycle_id,
            season_flag = season.as_u8(),
            base_growth_days = base_growth_days,
            similar_cycles = similar.len(),
            prior_year_cycles = prior.len(),
            "Derived cycle features"
        );

        Ok(DerivedFeatures {
            record,
            plant_date: Some(plant),
            expected_harvest: Some(expected_harvest),
            season_flag: Some(season),
            business_adjustment_days: adjustment,
        })
    }

    /// Derive the feature record of a request payload
    pub fn derive_payload(&self, payload: &CyclePayload) -> ForecastResult<DerivedFeatures> {
        payload.validate()?;
        let transplant = payload.transplant_date;

        let similar_yield = reference_yield(&payload.recent_cycles);
        let similar_days = reference_days(&payload.recent_cycles);
        let adjustment = business_adjustment_days(&AdjustmentInputs {
            transplant,
            baseline_days: similar_days,
            actual_harvest: payload.actual_harvest_date,
            planned_harvest: payload.planned_harvest_date,
            target_week: payload.target_week,
        });
        let season = transplant.map(season_flag);

        let mut record = FeatureRecord::new();
        put(
            &mut record,
            "nursery_days",
            days_between(payload.sowing_date, transplant),
        );
        put(&mut record, "transplant_month", transplant.map(|t| t.month() as f64));
        put(
            &mut record,
            "group_normal",
            payload.group.as_deref().map(|g| {
                let g = g.trim().to_lowercase();
                if NORMAL_GROUP_LABELS.contains(&g.as_str()) {
                    1.0
                } else {
                    0.0
                }
            }),
        );
        put(&mut record, "area_m2", payload.area_m2);
        put(&mut record, "harvest_partial_ratio", payload.harvest_partial_ratio);
        put(
            &mut record,
            "days_since_transplant",
            days_between(transplant, payload.now),
        );
        put(&mut record, "similar_bed_avg_yield", similar_yield);
        put(&mut record, "similar_bed_avg_days", similar_days);
        put(&mut record, "sales_adjust_days", adjustment);
        put(&mut record, "season_flag", season.map(|s| s.as_u8() as f64));

        Ok(DerivedFeatures {
            record,
            plant_date: transplant,
            expected_harvest: payload.actual_harvest_date.or(payload.planned_harvest_date),
            season_flag: season,
            business_adjustment_days: adjustment,
        })
    }

    fn reference(&self, store: &dyn CycleStore, cycle: &Cycle) -> ForecastResult<CycleReference> {
        Ok(CycleReference {
            avg_yield: store.total_yield(cycle.id)?,
            avg_days: cycle.growth_days().map(|d| d as f64),
            n: 1.0,
        })
    }
}

/// Insert only defined values so the key stays absent otherwise
fn put(record: &mut FeatureRecord, key: &str, value: Option<f64>) {
    if let Some(v) = value.filter(|v| v.is_finite()) {
        record.set(key, Some(v));
    }
}

fn days_between(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Option<f64> {
    Some((to? - from?).num_days() as f64)
}
