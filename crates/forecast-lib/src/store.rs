//! Historical cycle data access
//!
//! The deriver only needs a handful of read queries, so storage sits behind
//! the [`CycleStore`] trait. [`SnapshotCycleStore`] serves them from a JSON
//! export of cycles, harvests and daily weather.

use crate::error::{ForecastError, ForecastResult};
use crate::models::{Cycle, Harvest, SeasonFlag, WeatherDay};
use anyhow::Context;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Read-only queries over historical cultivation data
///
/// Calls are blocking; async callers should run them off the runtime.
pub trait CycleStore: Send + Sync {
    fn cycle(&self, id: i64) -> ForecastResult<Option<Cycle>>;

    /// Every cycle planted in `season` whose harvest has started
    fn harvested_cycles(&self, season: SeasonFlag) -> ForecastResult<Vec<Cycle>>;

    /// Cycles of a bed group planted within `[from, to]`
    fn group_cycles(&self, bed_group: &str, from: NaiveDate, to: NaiveDate) -> ForecastResult<Vec<Cycle>>;

    /// Summed harvest weight of a cycle, `None` when nothing was harvested
    fn total_yield(&self, cycle_id: i64) -> ForecastResult<Option<f64>>;

    /// Daily weather within `[from, to]`
    fn weather(&self, from: NaiveDate, to: NaiveDate) -> ForecastResult<Vec<WeatherDay>>;
}

/// In-memory store loaded from a JSON snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotCycleStore {
    #[serde(default)]
    pub cycles: Vec<Cycle>,
    #[serde(default)]
    pub harvests: Vec<Harvest>,
    #[serde(default)]
    pub weather: Vec<WeatherDay>,
}

impl SnapshotCycleStore {
    pub fn from_path(path: &Path) -> ForecastResult<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read cycle snapshot {:?}", path))
            .map_err(|e| ForecastError::Store(format!("{:#}", e)))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ForecastResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| ForecastError::Store(format!("Invalid cycle snapshot: {}", e)))
    }
}

impl CycleStore for SnapshotCycleStore {
    fn cycle(&self, id: i64) -> ForecastResult<Option<Cycle>> {
        Ok(self.cycles.iter().find(|c| c.id == id).cloned())
    }

    fn harvested_cycles(&self, season: SeasonFlag) -> ForecastResult<Vec<Cycle>> {
        Ok(self
            .cycles
            .iter()
            .filter(|c| c.harvest_start.is_some() && c.season_flag() == season)
            .cloned()
            .collect())
    }

    fn group_cycles(&self, bed_group: &str, from: NaiveDate, to: NaiveDate) -> ForecastResult<Vec<Cycle>> {
        Ok(self
            .cycles
            .iter()
            .filter(|c| c.bed_group == bed_group && c.plant_date >= from && c.plant_date <= to)
            .cloned()
            .collect())
    }

    fn total_yield(&self, cycle_id: i64) -> ForecastResult<Option<f64>> {
        let mut harvests = self.harvests.iter().filter(|h| h.cycle_id == cycle_id).peekable();
        if harvests.peek().is_none() {
            return Ok(None);
        }
        Ok(Some(harvests.map(|h| h.harvest_kg).sum()))
    }

    fn weather(&self, from: NaiveDate, to: NaiveDate) -> ForecastResult<Vec<WeatherDay>> {
        Ok(self
            .weather
            .iter()
            .filter(|w| w.date >= from && w.date <= to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn snapshot() -> SnapshotCycleStore {
        SnapshotCycleStore::from_json(
            r#"{
                "cycles": [
                    {"id": 1, "bed_id": 10, "bed_group": "normal", "plant_date": "2024-07-05", "harvest_start": "2024-08-20"},
                    {"id": 2, "bed_id": 11, "bed_group": "normal", "plant_date": "2025-07-01"},
                    {"id": 3, "bed_id": 12, "bed_group": "late", "plant_date": "2025-01-10", "harvest_start": "2025-05-10"}
                ],
                "harvests": [
                    {"cycle_id": 1, "harvest_date": "2024-08-20", "harvest_kg": 40.0},
                    {"cycle_id": 1, "harvest_date": "2024-08-27", "harvest_kg": 35.5}
                ],
                "weather": [
                    {"date": "2025-07-01", "temp_avg": 25.0, "temp_max": 30.0, "temp_min": 20.0},
                    {"date": "2025-07-02", "temp_avg": 27.0, "temp_max": 33.0, "temp_min": 21.0}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_cycle_lookup() {
        let store = snapshot();
        assert_eq!(store.cycle(2).unwrap().unwrap().bed_id, 11);
        assert!(store.cycle(99).unwrap().is_none());
    }

    #[test]
    fn test_harvested_cycles_skips_unharvested() {
        let store = snapshot();
        let days = |season| -> Vec<Option<i64>> {
            store
                .harvested_cycles(season)
                .unwrap()
                .iter()
                .map(Cycle::growth_days)
                .collect()
        };
        assert_eq!(days(SeasonFlag::Summer), vec![Some(46)]);
        assert_eq!(days(SeasonFlag::Winter), vec![Some(120)]);
        assert!(days(SeasonFlag::Shoulder).is_empty());
    }

    #[test]
    fn test_group_cycles_inclusive_window() {
        let store = snapshot();
        let found = store
            .group_cycles("normal", date("2024-07-05"), date("2025-07-01"))
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(store
            .group_cycles("late", date("2025-01-11"), date("2025-02-01"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_total_yield() {
        let store = snapshot();
        assert_eq!(store.total_yield(1).unwrap(), Some(75.5));
        assert_eq!(store.total_yield(2).unwrap(), None);
    }

    #[test]
    fn test_weather_range() {
        let store = snapshot();
        assert_eq!(store.weather(date("2025-07-02"), date("2025-07-31")).unwrap().len(), 1);
    }

    #[test]
    fn test_from_path_errors_are_store_errors() {
        let dir = TempDir::new().unwrap();
        let missing = SnapshotCycleStore::from_path(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(missing, ForecastError::Store(_)));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{\"cycles\": 3}").unwrap();
        assert!(matches!(SnapshotCycleStore::from_path(&bad), Err(ForecastError::Store(_))));
    }
}
