//! Output formatting utilities

use chrono::NaiveDate;
use clap::ValueEnum;
use colored::Colorize;
use forecast_lib::SeasonFlag;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// JSON on a single line (default)
    #[default]
    Json,
    /// Human-readable table
    Table,
}

/// Successful single-cycle forecast, as printed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleForecast {
    pub status: &'static str,
    pub cycle_id: i64,
    pub expected_harvest_date: Option<NaiveDate>,
    pub predicted_growth_days: i64,
    pub predicted_yield: f64,
    pub predicted_yield_corrected: f64,
    pub season_flag: Option<SeasonFlag>,
    pub sales_adjust_days: Option<f64>,
}

#[derive(Serialize)]
struct ErrorOutput<'a> {
    status: &'static str,
    message: &'a str,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

/// Round to one decimal place, half away from zero
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

pub fn print_forecast(forecast: &CycleForecast, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(forecast)?),
        OutputFormat::Table => {
            println!("{} {}", "Cycle".bold(), forecast.cycle_id.to_string().cyan());
            let rows = vec![
                FieldRow {
                    field: "Expected harvest",
                    value: or_dash(forecast.expected_harvest_date),
                },
                FieldRow {
                    field: "Growth days",
                    value: forecast.predicted_growth_days.to_string(),
                },
                FieldRow {
                    field: "Yield",
                    value: format!("{:.1}", forecast.predicted_yield),
                },
                FieldRow {
                    field: "Yield (corrected)",
                    value: format!("{:.1}", forecast.predicted_yield_corrected),
                },
                FieldRow {
                    field: "Season flag",
                    value: or_dash(forecast.season_flag.map(SeasonFlag::as_u8)),
                },
                FieldRow {
                    field: "Sales adjust days",
                    value: or_dash(forecast.sales_adjust_days),
                },
            ];
            println!("{}", Table::new(rows).with(Style::rounded()));
        }
    }
    Ok(())
}

/// Print a failure; JSON stays on stdout so callers can parse it
pub fn print_error(message: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let body = ErrorOutput {
                status: "error",
                message,
            };
            match serde_json::to_string(&body) {
                Ok(json) => println!("{}", json),
                Err(_) => println!("{{\"status\":\"error\"}}"),
            }
        }
        OutputFormat::Table => eprintln!("{} {}", "✗".red().bold(), message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round1() {
        assert_eq!(round1(84.96), 85.0);
        assert_eq!(round1(110.04), 110.0);
        assert_eq!(round1(-2.25), -2.3);
    }

    #[test]
    fn test_forecast_json_shape() {
        let forecast = CycleForecast {
            status: "success",
            cycle_id: 7,
            expected_harvest_date: NaiveDate::from_ymd_opt(2025, 8, 20),
            predicted_growth_days: 52,
            predicted_yield: 110.0,
            predicted_yield_corrected: 85.0,
            season_flag: Some(SeasonFlag::Summer),
            sales_adjust_days: None,
        };
        let value = serde_json::to_value(&forecast).unwrap();
        assert_eq!(value["expected_harvest_date"], "2025-08-20");
        assert_eq!(value["season_flag"], 1);
        assert!(value["sales_adjust_days"].is_null());
    }
}
