//! Regressors, preprocessing and the prediction engine

mod engine;
mod ensemble;
mod features;
mod inference;
mod preprocess;

pub use engine::{correct_partial_yield, DerivedFeatures, PredictionEngine, PARTIAL_BLEND_ALPHA};
pub use ensemble::{JsonRegressor, LinearModel, TreeEnsemble, TreeNode};
pub use features::{coerce_value, FeatureMatrix, FeatureVectorBuilder, DEFAULT_FILL_VALUE};
pub use inference::OnnxRegressor;
pub use preprocess::{
    ColumnGroup, ColumnTransformer, GroupTransformer, Preprocessor, Remainder, Transform,
};

use anyhow::Result;
use tract_onnx::prelude::tract_ndarray::ArrayView2;

/// A trained regression model producing one value per input row
pub trait Regressor: Send + Sync {
    /// Predict one value per row of `x`
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>>;

    /// Input feature names the model was trained on, when it records them
    fn feature_names(&self) -> Option<&[String]> {
        None
    }

    /// Short label for logs
    fn kind(&self) -> &'static str;
}
