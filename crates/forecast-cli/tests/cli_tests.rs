//! CLI integration tests

use serde_json::Value;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const ENV_VARS: [&str; 6] = [
    "FORECAST_DATA_PATH",
    "FORECAST_MODEL_PATH_DAYS",
    "FORECAST_MODEL_PATH_YIELD",
    "FORECAST_PREPROC_PATH",
    "FORECAST_FEATURE_META_PATH",
    "FORECAST_REQUIRED_FEATURES",
];

fn harvest_predict(args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_harvest-predict"));
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.args(args).output().expect("Failed to execute command")
}

fn write_fixture(dir: &Path) {
    fs::write(
        dir.join("cycles.json"),
        r#"{
            "cycles": [
                {"id": 7, "bed_id": 3, "bed_group": "normal", "plant_date": "2025-07-01", "harvest_start": "2025-08-25"},
                {"id": 8, "bed_id": 4, "bed_group": "normal", "plant_date": "2025-07-03"}
            ],
            "harvests": [{"cycle_id": 7, "harvest_date": "2025-08-25", "harvest_kg": 42.0}]
        }"#,
    )
    .unwrap();
    fs::write(
        dir.join("days.json"),
        r#"{"type": "linear", "coefficients": [1.0, 0.0], "intercept": 2.0}"#,
    )
    .unwrap();
    fs::write(
        dir.join("yield.json"),
        r#"{"type": "linear", "coefficients": [0.0, 10.0], "intercept": 100.0}"#,
    )
    .unwrap();
    fs::write(
        dir.join("meta.json"),
        r#"{"feature_order": ["base_growth_days", "season_flag"]}"#,
    )
    .unwrap();
}

fn path_arg(dir: &Path, name: &str) -> String {
    dir.join(name).to_string_lossy().into_owned()
}

fn run_fixture(dir: &TempDir, extra: &[&str]) -> Output {
    let data = path_arg(dir.path(), "cycles.json");
    let days = path_arg(dir.path(), "days.json");
    let yield_path = path_arg(dir.path(), "yield.json");
    let meta = path_arg(dir.path(), "meta.json");
    let mut args = vec![
        "--data",
        data.as_str(),
        "--model-days",
        days.as_str(),
        "--model-yield",
        yield_path.as_str(),
        "--feature-meta",
        meta.as_str(),
    ];
    args.extend_from_slice(extra);
    harvest_predict(&args)
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_cli_help() {
    let output = harvest_predict(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("--cycle-id"), "Should show cycle option");
    assert!(stdout.contains("--apply-partial"), "Should show partial option");
    assert!(stdout.contains("--data"), "Should show data option");
}

#[test]
fn test_cli_version() {
    let output = harvest_predict(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("harvest-predict"), "Should show binary name");
}

#[test]
fn test_forecast_success() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());

    let output = run_fixture(&dir, &["--cycle-id", "7"]);
    assert!(output.status.success());

    let body = stdout_json(&output);
    assert_eq!(body["status"], "success");
    assert_eq!(body["cycle_id"], 7);
    assert_eq!(body["expected_harvest_date"], "2025-08-20");
    assert_eq!(body["predicted_growth_days"], 52);
    assert_eq!(body["predicted_yield"], 110.0);
    assert_eq!(body["predicted_yield_corrected"], 110.0);
    assert_eq!(body["season_flag"], 1);
    assert_eq!(body["sales_adjust_days"], 5.0);
}

#[test]
fn test_forecast_with_partial_harvest() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());

    let output = run_fixture(
        &dir,
        &[
            "--cycle-id",
            "7",
            "--apply-partial",
            "--partial-yield",
            "30",
            "--partial-ratio",
            "0.5",
        ],
    );
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["predicted_yield_corrected"], 85.0);
}

#[test]
fn test_unharvested_cycle_uses_history() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());

    // Cycle 7 supplies a 55-day summer baseline
    let output = run_fixture(&dir, &["--cycle-id", "8"]);
    assert!(output.status.success());

    let body = stdout_json(&output);
    assert_eq!(body["predicted_growth_days"], 57);
    assert_eq!(body["expected_harvest_date"], "2025-08-27");
    assert!(body["sales_adjust_days"].is_null());
}

#[test]
fn test_unknown_cycle_fails() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());

    let output = run_fixture(&dir, &["--cycle-id", "99"]);
    assert_eq!(output.status.code(), Some(1));

    let body = stdout_json(&output);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("99"));
}

#[test]
fn test_missing_model_paths_fail() {
    let dir = TempDir::new().unwrap();
    write_fixture(dir.path());
    let data = path_arg(dir.path(), "cycles.json");

    let output = harvest_predict(&["--cycle-id", "7", "--data", data.as_str()]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["status"], "error");
}
