//! Core data models for the forecast engine

use crate::error::{ForecastError, ForecastResult};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Coarse climatic bucket of a planting date
///
/// Serialized as its integer value (1, 2 or 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SeasonFlag {
    /// Planted July to September
    Summer = 1,
    /// Planted November to March
    Winter = 2,
    /// Planted in April, May, June or October
    Shoulder = 3,
}

impl SeasonFlag {
    pub fn from_month(month: u32) -> Self {
        match month {
            7..=9 => SeasonFlag::Summer,
            11 | 12 | 1..=3 => SeasonFlag::Winter,
            _ => SeasonFlag::Shoulder,
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self::from_month(date.month())
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Fallback growth days when no harvested history exists for the season
    pub fn default_growth_days(self) -> f64 {
        match self {
            SeasonFlag::Summer => 50.0,
            SeasonFlag::Winter => 120.0,
            SeasonFlag::Shoulder => 80.0,
        }
    }
}

impl From<SeasonFlag> for u8 {
    fn from(flag: SeasonFlag) -> Self {
        flag as u8
    }
}

impl TryFrom<u8> for SeasonFlag {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SeasonFlag::Summer),
            2 => Ok(SeasonFlag::Winter),
            3 => Ok(SeasonFlag::Shoulder),
            other => Err(format!("season flag must be 1, 2 or 3, got {}", other)),
        }
    }
}

/// One planting-to-harvest record for a bed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub id: i64,
    pub bed_id: i64,
    /// Bed group type used for similar-bed comparisons
    pub bed_group: String,
    pub plant_date: NaiveDate,
    #[serde(default)]
    pub harvest_start: Option<NaiveDate>,
}

impl Cycle {
    pub fn season_flag(&self) -> SeasonFlag {
        SeasonFlag::from_date(self.plant_date)
    }

    /// Days from planting to the first harvest, when harvesting has started
    pub fn growth_days(&self) -> Option<i64> {
        self.harvest_start
            .map(|h| (h - self.plant_date).num_days())
    }
}

/// A single harvest event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Harvest {
    pub cycle_id: i64,
    pub harvest_date: NaiveDate,
    pub harvest_kg: f64,
}

/// Daily weather observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherDay {
    pub date: NaiveDate,
    pub temp_avg: f64,
    pub temp_max: f64,
    pub temp_min: f64,
}

/// Summary of one or more historical cycles, weighted by `n`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReference {
    #[serde(default)]
    pub avg_yield: Option<f64>,
    #[serde(default)]
    pub avg_days: Option<f64>,
    #[serde(default = "default_weight")]
    pub n: f64,
}

fn default_weight() -> f64 {
    1.0
}

/// Named feature values for one prediction
///
/// Values stay as raw JSON so non-numeric input can be reported precisely
/// instead of being lost during deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord(BTreeMap<String, serde_json::Value>);

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an optional numeric value; undefined and non-finite become null
    pub fn set(&mut self, name: impl Into<String>, value: Option<f64>) {
        let json = value
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
        self.0.insert(name.into(), json);
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Numeric value of a key, if present and numeric
    pub fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(|v| v.as_f64())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, serde_json::Value)> for FeatureRecord {
    fn from_iter<T: IntoIterator<Item = (String, serde_json::Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Raw feature input: a named map or a positional array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureInput {
    Named(FeatureRecord),
    Positional(Vec<serde_json::Value>),
}

impl FeatureInput {
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureInput::Named(_) => "named",
            FeatureInput::Positional(_) => "positional",
        }
    }
}

/// Request-time description of a cycle that has no stored history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CyclePayload {
    #[serde(default)]
    pub bed_id: Option<String>,
    /// Bed group label such as "normal", "early" or "late"
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub sowing_date: Option<NaiveDate>,
    #[serde(default)]
    pub transplant_date: Option<NaiveDate>,
    #[serde(default)]
    pub area_m2: Option<f64>,
    #[serde(default)]
    pub harvest_partial_ratio: Option<f64>,
    #[serde(default, alias = "recent_cycle_refs")]
    pub recent_cycles: Vec<CycleReference>,
    /// ISO week the harvest is planned for
    #[serde(default, alias = "calendar_week_target")]
    pub target_week: Option<u32>,
    #[serde(default)]
    pub actual_harvest_date: Option<NaiveDate>,
    #[serde(default)]
    pub planned_harvest_date: Option<NaiveDate>,
    /// Reference day for `days_since_transplant`; accepts a date or an RFC 3339 timestamp
    #[serde(default, deserialize_with = "flexible_date")]
    pub now: Option<NaiveDate>,
}

impl CyclePayload {
    /// Range checks on the numeric fields
    pub fn validate(&self) -> ForecastResult<()> {
        if let Some(area) = self.area_m2 {
            if !(area > 0.0) {
                return Err(ForecastError::validation(format!("area_m2 must be positive, got {}", area)));
            }
        }
        if let Some(ratio) = self.harvest_partial_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ForecastError::validation(format!(
                    "harvest_partial_ratio must be within [0, 1], got {}",
                    ratio
                )));
            }
        }
        if let Some(week) = self.target_week {
            if !(1..=53).contains(&week) {
                return Err(ForecastError::validation(format!(
                    "calendar_week_target must be within 1..=53, got {}",
                    week
                )));
            }
        }
        if let (Some(sowing), Some(transplant)) = (self.sowing_date, self.transplant_date) {
            if sowing > transplant {
                return Err(ForecastError::validation("sowing_date is after transplant_date"));
            }
        }
        if let Some(index) = self.recent_cycles.iter().position(|r| !(r.n >= 0.0)) {
            return Err(ForecastError::validation(format!(
                "recent_cycle_refs[{}].n must not be negative",
                index
            )));
        }
        Ok(())
    }
}

fn flexible_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(date));
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.date_naive()))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| Some(dt.date()))
        })
        .map_err(serde::de::Error::custom)
}

/// Partial-harvest override supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialHarvest {
    #[serde(default)]
    pub apply: bool,
    #[serde(default)]
    pub partial_yield: Option<f64>,
    #[serde(default)]
    pub partial_ratio: Option<f64>,
}

/// One days/yield pair from the dual-model batch path
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DualPrediction {
    pub days: f64,
    #[serde(rename = "yield")]
    pub yield_kg: f64,
}

/// Details on how a forecast was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionDiagnostics {
    /// Short digest of the artifact signature that served the request
    pub bundle_fingerprint: String,
    /// Which source supplied the feature order
    pub feature_order_source: Option<String>,
    pub preprocessed: bool,
    /// Ordered features that were absent and filled
    pub filled_features: Vec<String>,
    /// Total yield extrapolated from the partial harvest, when applied
    pub partial_estimate: Option<f64>,
}

/// Forecast for one cultivation cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_days: i64,
    pub predicted_yield: f64,
    pub predicted_yield_corrected: f64,
    pub season_flag: Option<SeasonFlag>,
    pub business_adjustment_days: Option<f64>,
    pub expected_harvest_date: Option<NaiveDate>,
    pub diagnostics: PredictionDiagnostics,
}
