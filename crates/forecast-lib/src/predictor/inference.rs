//! ONNX regressor inference using tract
//!
//! Runs exported regressors row by row with a fixed `[1, width]` f32 input,
//! taking the first output value of each run as the prediction.

use super::Regressor;
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::infer::Factoid;
use tracing::{debug, warn};

/// Maximum per-row inference latency before warning
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based regressor
pub struct OnnxRegressor {
    model: TractModel,
    width: usize,
}

impl OnnxRegressor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read ONNX model {:?}", path))?;
        Self::from_bytes(&bytes)
    }

    /// Load and optimize an ONNX model from bytes
    pub fn from_bytes(model_bytes: &[u8]) -> Result<Self> {
        let inference = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?;

        let width = inference
            .input_fact(0)
            .context("ONNX model has no inputs")?
            .shape
            .dims()
            .last()
            .and_then(|d| d.concretize())
            .and_then(|d| d.to_i64().ok())
            .and_then(|v| usize::try_from(v).ok())
            .context("ONNX model does not declare a fixed input width")?;

        let model = inference
            .with_input_fact(0, f32::fact([1, width]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        Ok(Self { model, width })
    }

    fn run_row(&self, row: &[f64]) -> Result<f64> {
        let start = Instant::now();
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.width), data)
            .context("Failed to shape input row")?
            .into();

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let value = output
            .to_array_view::<f32>()?
            .iter()
            .next()
            .copied()
            .context("Model output is empty")?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(value as f64)
    }
}

impl Regressor for OnnxRegressor {
    fn predict(&self, x: tract_ndarray::ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.width && x.nrows() > 0 {
            anyhow::bail!(
                "ONNX model expects {} input columns, got {}",
                self.width,
                x.ncols()
            );
        }
        x.rows()
            .into_iter()
            .map(|row| self.run_row(&row.to_vec()))
            .collect()
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }
}
