//! Weighted historical averages and weather statistics

use crate::models::{CycleReference, WeatherDay};

/// Weighted mean of the entries that have a value
///
/// Entries whose weight is not positive add nothing. The result is undefined
/// when no entry has a value or the total weight is not positive.
pub fn weighted_average<T>(
    items: &[T],
    value: impl Fn(&T) -> Option<f64>,
    weight: impl Fn(&T) -> f64,
) -> Option<f64> {
    let (weighted_sum, weight_sum) = items
        .iter()
        .filter_map(|item| Some((value(item)?, weight(item))))
        .filter(|(v, w)| v.is_finite() && *w > 0.0)
        .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v * w, total + w));

    if weight_sum > 0.0 {
        Some(weighted_sum / weight_sum)
    } else {
        None
    }
}

/// `n`-weighted average yield of the references
pub fn reference_yield(refs: &[CycleReference]) -> Option<f64> {
    weighted_average(refs, |r| r.avg_yield, |r| r.n)
}

/// `n`-weighted average growth days of the references
pub fn reference_days(refs: &[CycleReference]) -> Option<f64> {
    weighted_average(refs, |r| r.avg_days, |r| r.n)
}

/// `a - b` when both sides are defined
pub fn difference(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    Some(a? - b?)
}

/// Temperature statistics over a window of daily observations
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeatherAggregates {
    pub temp_avg: Option<f64>,
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_std: Option<f64>,
    pub temp_range_avg: Option<f64>,
    pub temp_range_std: Option<f64>,
}

impl WeatherAggregates {
    /// Mean and population standard deviation of the daily average and the
    /// daily range, highest daily maximum and lowest daily minimum
    pub fn from_days(days: &[WeatherDay]) -> Self {
        if days.is_empty() {
            return Self::default();
        }
        let averages: Vec<f64> = days.iter().map(|d| d.temp_avg).collect();
        let ranges: Vec<f64> = days.iter().map(|d| d.temp_max - d.temp_min).collect();

        Self {
            temp_avg: mean(&averages),
            temp_max: days.iter().map(|d| d.temp_max).reduce(f64::max),
            temp_min: days.iter().map(|d| d.temp_min).reduce(f64::min),
            temp_std: population_std(&averages),
            temp_range_avg: mean(&ranges),
            temp_range_std: population_std(&ranges),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn population_std(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}
