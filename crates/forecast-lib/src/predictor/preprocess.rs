//! Pre-fit preprocessing transform
//!
//! A preprocessor artifact is a JSON tree of fitted steps: pipelines,
//! column transformers that route named column groups through their own
//! steps, and elementwise scalers/imputers. Parameters are fitted offline;
//! this module only applies them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tract_onnx::prelude::tract_ndarray::{concatenate, Array2, ArrayView2, Axis};

/// Fitted preprocessing artifact
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Preprocessor {
    /// Flat list of input columns the transform was fit on
    #[serde(default)]
    pub feature_names_in: Option<Vec<String>>,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transform {
    Pipeline { steps: Vec<Transform> },
    ColumnTransformer(ColumnTransformer),
    StandardScaler { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMaxScaler { min: Vec<f64>, scale: Vec<f64> },
    /// Replaces NaN with the fitted per-column statistic
    SimpleImputer { statistics: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnTransformer {
    pub transformers: Vec<ColumnGroup>,
    #[serde(default)]
    pub remainder: Remainder,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnGroup {
    pub name: String,
    pub columns: Vec<String>,
    pub transformer: GroupTransformer,
}

/// What a column group does with its columns
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "GroupTransformerRepr")]
pub enum GroupTransformer {
    Passthrough,
    Drop,
    Fitted(Box<Transform>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GroupTransformerRepr {
    Keyword(GroupKeyword),
    Fitted(Box<Transform>),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum GroupKeyword {
    Passthrough,
    Drop,
}

impl From<GroupTransformerRepr> for GroupTransformer {
    fn from(repr: GroupTransformerRepr) -> Self {
        match repr {
            GroupTransformerRepr::Keyword(GroupKeyword::Passthrough) => GroupTransformer::Passthrough,
            GroupTransformerRepr::Keyword(GroupKeyword::Drop) => GroupTransformer::Drop,
            GroupTransformerRepr::Fitted(t) => GroupTransformer::Fitted(t),
        }
    }
}

/// Handling of columns not claimed by any group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Remainder {
    #[default]
    Drop,
    Passthrough,
}

impl Preprocessor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preprocessor {:?}", path))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse preprocessor")
    }

    /// Input columns the preprocessor declares it was fit on
    ///
    /// Prefers the flat `feature_names_in` list. Otherwise walks to the first
    /// column transformer and concatenates its group columns in declared
    /// order, keeping the first occurrence of repeated names. Passthrough and
    /// drop groups count too, since the transform still looks their columns up.
    pub fn input_columns(&self) -> Option<Vec<String>> {
        if let Some(names) = self.feature_names_in.as_ref().filter(|n| !n.is_empty()) {
            return Some(names.clone());
        }

        let ct = self.transform.find_column_transformer()?;
        let mut seen = HashSet::new();
        let columns: Vec<String> = ct
            .transformers
            .iter()
            .flat_map(|group| group.columns.iter())
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect();

        if columns.is_empty() {
            None
        } else {
            Some(columns)
        }
    }

    /// Transform a batch whose columns are named by `columns`
    pub fn transform(&self, x: ArrayView2<'_, f64>, columns: &[String]) -> Result<Array2<f64>> {
        if x.ncols() != columns.len() {
            bail!(
                "preprocessor input has {} columns but {} names",
                x.ncols(),
                columns.len()
            );
        }
        let (out, _) = self.transform.apply(x.to_owned(), columns.to_vec())?;
        Ok(out)
    }
}

impl Transform {
    fn find_column_transformer(&self) -> Option<&ColumnTransformer> {
        match self {
            Transform::ColumnTransformer(ct) => Some(ct),
            Transform::Pipeline { steps } => steps.iter().find_map(|s| s.find_column_transformer()),
            _ => None,
        }
    }

    fn apply(&self, mut x: Array2<f64>, names: Vec<String>) -> Result<(Array2<f64>, Vec<String>)> {
        match self {
            Transform::Pipeline { steps } => {
                let mut current = (x, names);
                for step in steps {
                    current = step.apply(current.0, current.1)?;
                }
                Ok(current)
            }
            Transform::ColumnTransformer(ct) => ct.apply(x.view(), &names),
            Transform::StandardScaler { mean, scale } => {
                check_width("standard_scaler", &[mean, scale], x.ncols())?;
                for mut row in x.rows_mut() {
                    for (j, v) in row.iter_mut().enumerate() {
                        let s = if scale[j] == 0.0 { 1.0 } else { scale[j] };
                        *v = (*v - mean[j]) / s;
                    }
                }
                Ok((x, names))
            }
            Transform::MinMaxScaler { min, scale } => {
                check_width("min_max_scaler", &[min, scale], x.ncols())?;
                for mut row in x.rows_mut() {
                    for (j, v) in row.iter_mut().enumerate() {
                        *v = *v * scale[j] + min[j];
                    }
                }
                Ok((x, names))
            }
            Transform::SimpleImputer { statistics } => {
                check_width("simple_imputer", &[statistics], x.ncols())?;
                for mut row in x.rows_mut() {
                    for (j, v) in row.iter_mut().enumerate() {
                        if v.is_nan() {
                            *v = statistics[j];
                        }
                    }
                }
                Ok((x, names))
            }
        }
    }
}

impl ColumnTransformer {
    fn apply(&self, x: ArrayView2<'_, f64>, names: &[String]) -> Result<(Array2<f64>, Vec<String>)> {
        let index_of = |col: &str| {
            names
                .iter()
                .position(|n| n == col)
                .with_context(|| format!("column '{}' is not among the input columns", col))
        };

        let mut parts: Vec<Array2<f64>> = Vec::new();
        let mut out_names = Vec::new();
        let mut claimed = HashSet::new();

        for group in &self.transformers {
            let indices = group
                .columns
                .iter()
                .map(|c| index_of(c))
                .collect::<Result<Vec<usize>>>()?;
            claimed.extend(indices.iter().copied());

            let sub = x.select(Axis(1), &indices);
            match &group.transformer {
                GroupTransformer::Drop => {}
                GroupTransformer::Passthrough => {
                    out_names.extend(group.columns.iter().map(|c| format!("{}__{}", group.name, c)));
                    parts.push(sub);
                }
                GroupTransformer::Fitted(step) => {
                    let (transformed, step_names) = step
                        .apply(sub, group.columns.clone())
                        .with_context(|| format!("column group '{}' failed", group.name))?;
                    out_names.extend(step_names.iter().map(|c| format!("{}__{}", group.name, c)));
                    parts.push(transformed);
                }
            }
        }

        if self.remainder == Remainder::Passthrough {
            let rest: Vec<usize> = (0..names.len()).filter(|i| !claimed.contains(i)).collect();
            if !rest.is_empty() {
                out_names.extend(rest.iter().map(|&i| format!("remainder__{}", names[i])));
                parts.push(x.select(Axis(1), &rest));
            }
        }

        if parts.is_empty() {
            return Ok((Array2::zeros((x.nrows(), 0)), out_names));
        }
        let views: Vec<ArrayView2<'_, f64>> = parts.iter().map(|p| p.view()).collect();
        let out = concatenate(Axis(1), &views).context("Failed to assemble transformed columns")?;
        Ok((out, out_names))
    }
}

fn check_width(step: &str, params: &[&Vec<f64>], width: usize) -> Result<()> {
    for p in params {
        if p.len() != width {
            bail!("{} was fit on {} columns, got {}", step, p.len(), width);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tract_onnx::prelude::tract_ndarray::array;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    const COLUMN_PIPELINE: &str = r#"{
        "transform": {
            "type": "pipeline",
            "steps": [{
                "type": "column_transformer",
                "transformers": [
                    {"name": "num", "columns": ["temp", "days"], "transformer": {
                        "type": "pipeline",
                        "steps": [
                            {"type": "simple_imputer", "statistics": [20.0, 50.0]},
                            {"type": "standard_scaler", "mean": [20.0, 50.0], "scale": [2.0, 10.0]}
                        ]
                    }},
                    {"name": "flags", "columns": ["season"], "transformer": "passthrough"},
                    {"name": "unused", "columns": ["bed"], "transformer": "drop"},
                    {"name": "again", "columns": ["days", "yield"], "transformer":
                        {"type": "min_max_scaler", "min": [0.0, 0.0], "scale": [0.01, 0.001]}}
                ]
            }]
        }
    }"#;

    #[test]
    fn test_input_columns_from_column_groups() {
        let pre = Preprocessor::from_json(COLUMN_PIPELINE).unwrap();
        assert_eq!(
            pre.input_columns().unwrap(),
            names(&["temp", "days", "season", "bed", "yield"])
        );
    }

    #[test]
    fn test_resolved_columns_feed_transform() {
        let pre = Preprocessor::from_json(COLUMN_PIPELINE).unwrap();
        let cols = pre.input_columns().unwrap();
        let x = Array2::from_shape_vec((1, cols.len()), vec![22.0, 50.0, 1.0, 9.0, 500.0]).unwrap();
        let out = pre.transform(x.view(), &cols).unwrap();
        assert_eq!(out.ncols(), 5);
        assert_eq!(out[[0, 2]], 1.0);
    }

    #[test]
    fn test_input_columns_prefers_flat_list() {
        let json = r#"{"feature_names_in": ["b", "a"],
                       "transform": {"type": "standard_scaler", "mean": [0, 0], "scale": [1, 1]}}"#;
        let pre = Preprocessor::from_json(json).unwrap();
        assert_eq!(pre.input_columns().unwrap(), names(&["b", "a"]));
    }

    #[test]
    fn test_input_columns_absent_without_groups() {
        let json = r#"{"transform": {"type": "simple_imputer", "statistics": [1.0]}}"#;
        assert!(Preprocessor::from_json(json).unwrap().input_columns().is_none());
    }

    #[test]
    fn test_transform_routes_groups() {
        let pre = Preprocessor::from_json(COLUMN_PIPELINE).unwrap();
        let cols = names(&["temp", "days", "season", "bed", "yield"]);
        let x = array![[22.0, f64::NAN, 1.0, 9.0, 500.0]];
        let out = pre.transform(x.view(), &cols).unwrap();
        // num: (22-20)/2, (50-50)/10 ; flags: 1 ; again: nan*0.01, 500*0.001
        assert_eq!(out.ncols(), 5);
        assert_eq!(out[[0, 0]], 1.0);
        assert_eq!(out[[0, 1]], 0.0);
        assert_eq!(out[[0, 2]], 1.0);
        assert!(out[[0, 3]].is_nan());
        assert!((out[[0, 4]] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_remainder_passthrough() {
        let json = r#"{"transform": {"type": "column_transformer", "remainder": "passthrough",
            "transformers": [{"name": "s", "columns": ["a"],
                "transformer": {"type": "standard_scaler", "mean": [1.0], "scale": [1.0]}}]}}"#;
        let pre = Preprocessor::from_json(json).unwrap();
        let x = array![[3.0, 7.0]];
        let out = pre.transform(x.view(), &names(&["a", "b"])).unwrap();
        assert_eq!(out, array![[2.0, 7.0]]);
    }

    #[test]
    fn test_missing_column_is_error() {
        let pre = Preprocessor::from_json(COLUMN_PIPELINE).unwrap();
        let x = array![[1.0]];
        assert!(pre.transform(x.view(), &names(&["temp"])).is_err());
    }

    #[test]
    fn test_width_mismatch_is_error() {
        let json = r#"{"transform": {"type": "standard_scaler", "mean": [0.0], "scale": [1.0]}}"#;
        let pre = Preprocessor::from_json(json).unwrap();
        let x = array![[1.0, 2.0]];
        assert!(pre.transform(x.view(), &names(&["a", "b"])).is_err());
    }
}
