//! Survival classifier capability
//!
//! The pipeline only depends on the [`Classifier`] trait. The bundled
//! [`LogisticClassifier`] evaluates a logistic-regression model whose
//! coefficients are either built in or loaded from a JSON weights file:
//!
//! ```json
//! { "intercept": 5.2, "coefficients": [-1.1, -2.6, -0.04, -0.33, -0.09, 0.002, 0.2, 0.1, -0.2] }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::models::{Embarked, Sex, ValidatedPassenger};

/// Number of encoded features
pub const FEATURE_COUNT: usize = 9;

/// Feature names in encoding order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "pclass",
    "sex_male",
    "age",
    "sib_sp",
    "parch",
    "fare",
    "embarked_c",
    "embarked_q",
    "embarked_s",
];

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("invalid feature vector: {0}")]
    InvalidFeatures(String),

    #[error("model produced an invalid probability: {0}")]
    InvalidOutput(f64),

    #[error("failed to read model weights: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse model weights: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Encoded model input
///
/// Order follows [`FEATURE_NAMES`]: numeric fields as-is, sex as a binary
/// `male` flag, embarkation port one-hot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn encode(passenger: &ValidatedPassenger) -> Self {
        let one_hot = |port: Embarked| if passenger.embarked == port { 1.0 } else { 0.0 };
        Self([
            f64::from(passenger.pclass),
            if passenger.sex == Sex::Male { 1.0 } else { 0.0 },
            passenger.age,
            f64::from(passenger.sib_sp),
            f64::from(passenger.parch),
            passenger.fare,
            one_hot(Embarked::C),
            one_hot(Embarked::Q),
            one_hot(Embarked::S),
        ])
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.0
    }
}

/// Maps a feature vector to `[p(not_survived), p(survived)]`
pub trait Classifier: Send + Sync {
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], ClassifierError>;

    /// Model identifier attached to metrics
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LogisticWeights {
    pub intercept: f64,
    pub coefficients: [f64; FEATURE_COUNT],
}

impl Default for LogisticWeights {
    fn default() -> Self {
        Self {
            intercept: 5.2,
            coefficients: [-1.1, -2.6, -0.04, -0.33, -0.09, 0.002, 0.2, 0.1, -0.2],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    weights: LogisticWeights,
}

impl Default for LogisticClassifier {
    fn default() -> Self {
        Self::new(LogisticWeights::default())
    }
}

impl LogisticClassifier {
    pub fn new(weights: LogisticWeights) -> Self {
        Self { weights }
    }

    pub fn from_file(path: &Path) -> Result<Self, ClassifierError> {
        let raw = std::fs::read_to_string(path)?;
        let weights: LogisticWeights = serde_json::from_str(&raw)?;
        Ok(Self::new(weights))
    }

    pub fn weights(&self) -> &LogisticWeights {
        &self.weights
    }
}

impl Classifier for LogisticClassifier {
    fn predict_proba(&self, features: &FeatureVector) -> Result<[f64; 2], ClassifierError> {
        if let Some(idx) = features.values().iter().position(|v| !v.is_finite()) {
            return Err(ClassifierError::InvalidFeatures(format!(
                "{} is not finite",
                FEATURE_NAMES[idx]
            )));
        }

        let z = self.weights.intercept
            + self
                .weights
                .coefficients
                .iter()
                .zip(features.values())
                .map(|(w, x)| w * x)
                .sum::<f64>();
        let survived = 1.0 / (1.0 + (-z).exp());

        if !(0.0..=1.0).contains(&survived) {
            return Err(ClassifierError::InvalidOutput(survived));
        }

        Ok([1.0 - survived, survived])
    }

    fn name(&self) -> &str {
        "logistic_regression"
    }
}
