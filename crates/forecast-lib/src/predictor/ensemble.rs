//! JSON-serialized regressors
//!
//! Two model shapes are supported:
//! - `tree_ensemble`: gradient-boosted regression trees. The prediction is
//!   `base_score` plus the leaf value reached in every tree.
//! - `linear`: `intercept + coefficients . x`.

use super::Regressor;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tract_onnx::prelude::tract_ndarray::{ArrayView1, ArrayView2};

/// A node of a regression tree, addressed by index within its tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Direction taken when the feature value is NaN
        #[serde(default = "default_left")]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn validate(&self, index: usize) -> Result<usize> {
        if self.nodes.is_empty() {
            bail!("tree {} has no nodes", index);
        }
        let mut max_feature = 0;
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, left, right, .. } = node {
                if *left >= self.nodes.len() || *right >= self.nodes.len() {
                    bail!("tree {} node {} points outside the tree", index, i);
                }
                max_feature = max_feature.max(feature + 1);
            }
        }
        Ok(max_feature)
    }

    /// Walk from the root to a leaf. The walk is bounded by the node count so
    /// a malformed cyclic tree fails instead of looping.
    fn leaf_value(&self, row: ArrayView1<'_, f64>) -> Result<f64> {
        let mut idx = 0;
        for _ in 0..=self.nodes.len() {
            match &self.nodes[idx] {
                TreeNode::Leaf { leaf } => return Ok(*leaf),
                TreeNode::Split { feature, threshold, left, right, default_left } => {
                    let value = row[*feature];
                    let go_left = if value.is_nan() { *default_left } else { value < *threshold };
                    idx = if go_left { *left } else { *right };
                }
            }
        }
        bail!("tree walk did not reach a leaf")
    }
}

/// Gradient-boosted tree ensemble
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
    #[serde(skip)]
    min_width: usize,
}

impl TreeEnsemble {
    fn validated(mut self) -> Result<Self> {
        let mut width = 0;
        for (i, tree) in self.trees.iter().enumerate() {
            width = width.max(tree.validate(i)?);
        }
        if let Some(names) = &self.feature_names {
            if names.len() < width {
                bail!(
                    "trees reference feature index {} but only {} feature names are declared",
                    width - 1,
                    names.len()
                );
            }
        }
        self.min_width = width;
        Ok(self)
    }
}

impl Regressor for TreeEnsemble {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        if x.nrows() > 0 && x.ncols() < self.min_width {
            bail!(
                "tree ensemble needs at least {} input columns, got {}",
                self.min_width,
                x.ncols()
            );
        }
        x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .try_fold(self.base_score, |acc, tree| {
                        Ok::<f64, anyhow::Error>(acc + tree.leaf_value(row)?)
                    })
            })
            .collect()
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn kind(&self) -> &'static str {
        "tree_ensemble"
    }
}

/// Ordinary linear regression
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LinearModel {
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl Regressor for LinearModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        if x.nrows() > 0 && x.ncols() != self.coefficients.len() {
            bail!(
                "linear model has {} coefficients, got {} input columns",
                self.coefficients.len(),
                x.ncols()
            );
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .zip(&self.coefficients)
                    .fold(self.intercept, |acc, (v, c)| acc + v * c)
            })
            .collect())
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }

    fn kind(&self) -> &'static str {
        "linear"
    }
}

/// A regressor deserialized from a JSON artifact
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonRegressor {
    TreeEnsemble(TreeEnsemble),
    Linear(LinearModel),
}

impl JsonRegressor {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model file {:?}", path))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let model: JsonRegressor =
            serde_json::from_str(content).context("Failed to parse JSON model")?;
        match model {
            JsonRegressor::TreeEnsemble(ensemble) => {
                Ok(JsonRegressor::TreeEnsemble(ensemble.validated()?))
            }
            JsonRegressor::Linear(linear) => {
                if let Some(names) = &linear.feature_names {
                    if names.len() != linear.coefficients.len() {
                        bail!(
                            "linear model declares {} feature names for {} coefficients",
                            names.len(),
                            linear.coefficients.len()
                        );
                    }
                }
                Ok(JsonRegressor::Linear(linear))
            }
        }
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            JsonRegressor::TreeEnsemble(m) => m,
            JsonRegressor::Linear(m) => m,
        }
    }
}

impl Regressor for JsonRegressor {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        self.inner().predict(x)
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.inner().feature_names()
    }

    fn kind(&self) -> &'static str {
        self.inner().kind()
    }
}
