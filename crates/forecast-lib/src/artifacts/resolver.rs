//! Feature-order resolution
//!
//! Sources are tried strictly in this order, first non-empty answer wins:
//! metadata file, preprocessor input columns, days model, yield model.

use super::FeatureMeta;
use crate::predictor::{Preprocessor, Regressor};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, warn};

/// Where a feature order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureOrderSource {
    Meta,
    Preprocessor,
    DaysModel,
    YieldModel,
}

impl FeatureOrderSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureOrderSource::Meta => "meta",
            FeatureOrderSource::Preprocessor => "preprocessor",
            FeatureOrderSource::DaysModel => "days_model",
            FeatureOrderSource::YieldModel => "yield_model",
        }
    }
}

impl fmt::Display for FeatureOrderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOrder {
    pub names: Vec<String>,
    pub source: FeatureOrderSource,
}

type OrderProvider<'a> = Box<dyn Fn() -> Option<Vec<String>> + 'a>;

pub struct FeatureOrderResolver;

impl FeatureOrderResolver {
    pub fn resolve(
        meta: Option<&FeatureMeta>,
        preprocessor: Option<&Preprocessor>,
        days_model: Option<&dyn Regressor>,
        yield_model: Option<&dyn Regressor>,
    ) -> Option<ResolvedOrder> {
        let providers: [(FeatureOrderSource, OrderProvider<'_>); 4] = [
            (
                FeatureOrderSource::Meta,
                Box::new(move || meta.and_then(FeatureMeta::feature_order)),
            ),
            (
                FeatureOrderSource::Preprocessor,
                Box::new(move || preprocessor.and_then(Preprocessor::input_columns)),
            ),
            (
                FeatureOrderSource::DaysModel,
                Box::new(move || days_model.and_then(|m| m.feature_names()).map(<[String]>::to_vec)),
            ),
            (
                FeatureOrderSource::YieldModel,
                Box::new(move || yield_model.and_then(|m| m.feature_names()).map(<[String]>::to_vec)),
            ),
        ];

        providers.into_iter().find_map(|(source, provider)| {
            let names = provider().filter(|n| !n.is_empty());
            let Some(names) = names else {
                debug!(source = %source, "No feature order from source");
                return None;
            };
            if let Some(dup) = first_duplicate(&names) {
                warn!(source = %source, duplicate = %dup, "Ignoring feature order with duplicate names");
                return None;
            }
            Some(ResolvedOrder { names, source })
        })
    }
}

fn first_duplicate(names: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    names.iter().map(String::as_str).find(|n| !seen.insert(*n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::JsonRegressor;

    fn linear(names: &[&str]) -> JsonRegressor {
        let json = serde_json::json!({
            "type": "linear",
            "feature_names": names,
            "coefficients": vec![1.0; names.len()],
        });
        JsonRegressor::from_json(&json.to_string()).unwrap()
    }

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_meta_wins() {
        let meta = FeatureMeta::from_json(r#"{"feature_order": ["m1", "m2"]}"#).unwrap();
        let pre = Preprocessor::from_json(
            r#"{"feature_names_in": ["p"], "transform": {"type": "simple_imputer", "statistics": [0]}}"#,
        )
        .unwrap();
        let days = linear(&["d"]);
        let resolved =
            FeatureOrderResolver::resolve(Some(&meta), Some(&pre), Some(&days as &dyn Regressor), None).unwrap();
        assert_eq!(resolved.names, strings(&["m1", "m2"]));
        assert_eq!(resolved.source, FeatureOrderSource::Meta);
    }

    #[test]
    fn test_preprocessor_before_models() {
        let meta = FeatureMeta::from_json(r#"{"other": 1}"#).unwrap();
        let pre = Preprocessor::from_json(
            r#"{"feature_names_in": ["p"], "transform": {"type": "simple_imputer", "statistics": [0]}}"#,
        )
        .unwrap();
        let days = linear(&["d"]);
        let resolved =
            FeatureOrderResolver::resolve(Some(&meta), Some(&pre), Some(&days as &dyn Regressor), None).unwrap();
        assert_eq!(resolved.source, FeatureOrderSource::Preprocessor);
    }

    #[test]
    fn test_falls_back_to_yield_model() {
        let days = JsonRegressor::from_json(r#"{"type": "linear", "coefficients": [1.0]}"#).unwrap();
        let yield_model = linear(&["y1", "y2"]);
        let resolved =
            FeatureOrderResolver::resolve(None, None, Some(&days as &dyn Regressor), Some(&yield_model as &dyn Regressor)).unwrap();
        assert_eq!(resolved.names, strings(&["y1", "y2"]));
        assert_eq!(resolved.source, FeatureOrderSource::YieldModel);
    }

    #[test]
    fn test_duplicates_skip_to_next_source() {
        let meta = FeatureMeta::from_json(r#"{"feature_order": ["a", "a"]}"#).unwrap();
        let days = linear(&["a", "b"]);
        let resolved = FeatureOrderResolver::resolve(Some(&meta), None, Some(&days as &dyn Regressor), None).unwrap();
        assert_eq!(resolved.source, FeatureOrderSource::DaysModel);
    }

    #[test]
    fn test_nothing_resolves() {
        assert!(FeatureOrderResolver::resolve(None, None, None, None).is_none());
    }
}
