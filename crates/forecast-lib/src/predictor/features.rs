//! Feature vector building
//!
//! Turns raw feature inputs (named maps or positional arrays) into a numeric
//! matrix aligned to the bundle's feature order. All shape and type checks
//! happen here, before any model is touched.

use crate::error::{ForecastError, ForecastResult};
use crate::models::{FeatureInput, FeatureRecord};
use serde_json::Value;
use std::collections::HashSet;
use tract_onnx::prelude::tract_ndarray::Array2;

/// Value used for absent, non-required named features
pub const DEFAULT_FILL_VALUE: f64 = 0.0;

/// Numeric batch, one row per input
pub type FeatureMatrix = Array2<f64>;

/// Builds feature matrices for one feature order
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder<'a> {
    feature_order: Option<&'a [String]>,
    required: HashSet<&'a str>,
    fill_value: f64,
}

impl<'a> FeatureVectorBuilder<'a> {
    pub fn new(feature_order: Option<&'a [String]>) -> Self {
        Self {
            feature_order,
            required: HashSet::new(),
            fill_value: DEFAULT_FILL_VALUE,
        }
    }

    /// Keys that must be present (and non-null) in every named record
    pub fn with_required(mut self, keys: &'a [String]) -> Self {
        self.required = keys.iter().map(String::as_str).collect();
        self
    }

    /// Value substituted for absent, non-required features
    pub fn with_fill_value(mut self, fill_value: f64) -> Self {
        self.fill_value = fill_value;
        self
    }

    pub fn build(&self, inputs: &[FeatureInput]) -> ForecastResult<FeatureMatrix> {
        let Some(first) = inputs.first() else {
            let width = self.feature_order.map_or(0, |o| o.len());
            return Ok(Array2::zeros((0, width)));
        };

        if let Some(index) = inputs.iter().position(|i| i.kind() != first.kind()) {
            return Err(ForecastError::validation(format!(
                "Mixed features at index={}: all records must be {} like index=0",
                index,
                first.kind()
            )));
        }

        match first {
            FeatureInput::Named(_) => self.build_named(inputs),
            FeatureInput::Positional(_) => self.build_positional(inputs),
        }
    }

    /// Build a single row from a named record and report which ordered
    /// features were absent
    pub fn build_record(&self, record: &FeatureRecord) -> ForecastResult<(Vec<f64>, Vec<String>)> {
        let order = self.require_order()?;
        let mut filled = Vec::new();
        let row = self.named_row(0, record, order, &mut filled)?;
        Ok((row, filled))
    }

    fn require_order(&self) -> ForecastResult<&'a [String]> {
        self.feature_order.ok_or_else(|| {
            ForecastError::config(
                "Named features require a feature order; configure a feature metadata file or use array inputs",
            )
        })
    }

    fn build_named(&self, inputs: &[FeatureInput]) -> ForecastResult<FeatureMatrix> {
        let order = self.require_order()?;
        let mut data = Vec::with_capacity(inputs.len() * order.len());
        let mut filled = Vec::new();
        for (index, input) in inputs.iter().enumerate() {
            if let FeatureInput::Named(record) = input {
                data.extend(self.named_row(index, record, order, &mut filled)?);
            }
        }
        to_matrix(inputs.len(), order.len(), data)
    }

    fn named_row(
        &self,
        index: usize,
        record: &FeatureRecord,
        order: &[String],
        filled: &mut Vec<String>,
    ) -> ForecastResult<Vec<f64>> {
        let mut row = Vec::with_capacity(order.len());
        for key in order {
            match record.get(key).filter(|v| !v.is_null()) {
                Some(value) => row.push(coerce_value(value).ok_or_else(|| {
                    ForecastError::validation(format!(
                        "Non-numeric feature at index={} key='{}': {}",
                        index, key, value
                    ))
                })?),
                None if self.required.contains(key.as_str()) => {
                    return Err(ForecastError::validation(format!(
                        "Missing required feature at index={} key='{}'",
                        index, key
                    )));
                }
                None => {
                    filled.push(key.clone());
                    row.push(self.fill_value);
                }
            }
        }
        Ok(row)
    }

    fn build_positional(&self, inputs: &[FeatureInput]) -> ForecastResult<FeatureMatrix> {
        let mut expected = self.feature_order.map(|o| o.len());
        let mut data = Vec::new();
        for (index, input) in inputs.iter().enumerate() {
            let FeatureInput::Positional(values) = input else {
                continue;
            };
            match expected {
                Some(len) if values.len() != len => {
                    return Err(ForecastError::validation(format!(
                        "Feature shape mismatch at index={}: expected length {}, got {}",
                        index,
                        len,
                        values.len()
                    )));
                }
                Some(_) => {}
                None => expected = Some(values.len()),
            }
            for (pos, value) in values.iter().enumerate() {
                data.push(coerce_value(value).ok_or_else(|| {
                    ForecastError::validation(format!(
                        "Non-numeric feature at index={} position={}: {}",
                        index, pos, value
                    ))
                })?);
            }
        }
        to_matrix(inputs.len(), expected.unwrap_or(0), data)
    }
}

/// Coerce a raw JSON value to a float
///
/// Numbers, numeric strings and booleans are accepted; anything else
/// (including null) is not.
pub fn coerce_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn to_matrix(rows: usize, cols: usize, data: Vec<f64>) -> ForecastResult<FeatureMatrix> {
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| ForecastError::validation(format!("Failed to assemble feature matrix: {}", e)))
}
