use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::stats::round3;

/// Raw passenger payload as decoded from `POST /predict`
///
/// Categorical fields stay as strings here; the pipeline's validation stage
/// turns them into [`Sex`] / [`Embarked`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictionRequest {
    #[serde(rename = "Pclass")]
    pub pclass: i64,
    #[serde(rename = "Sex")]
    pub sex: String,
    #[serde(rename = "Age")]
    pub age: f64,
    #[serde(rename = "SibSp")]
    pub sib_sp: i64,
    #[serde(rename = "Parch")]
    pub parch: i64,
    #[serde(rename = "Fare")]
    pub fare: f64,
    #[serde(rename = "Embarked")]
    pub embarked: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    /// Case-insensitive parse of `male` / `female`
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}

/// Port of embarkation: Cherbourg, Queenstown, Southampton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Embarked {
    C,
    Q,
    S,
}

impl Embarked {
    /// Case-insensitive parse of `C` / `Q` / `S`
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "C" => Some(Self::C),
            "Q" => Some(Self::Q),
            "S" => Some(Self::S),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "C",
            Self::Q => "Q",
            Self::S => "S",
        }
    }
}

/// Passenger whose every field satisfies its domain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidatedPassenger {
    pub pclass: u8,
    pub sex: Sex,
    pub age: f64,
    pub sib_sp: u32,
    pub parch: u32,
    pub fare: f64,
    pub embarked: Embarked,
}

impl PredictionRequest {
    /// Check every field against its domain
    ///
    /// Returns a human-readable message naming the first offending field.
    pub fn validate(&self) -> Result<ValidatedPassenger, String> {
        let pclass = match self.pclass {
            1..=3 => self.pclass as u8,
            other => return Err(format!("Pclass must be 1, 2 or 3, got {}", other)),
        };
        let sex = Sex::parse(&self.sex)
            .ok_or_else(|| format!("Sex must be 'male' or 'female', got '{}'", self.sex))?;
        if !(0.0..=100.0).contains(&self.age) {
            return Err(format!("Age must be within [0, 100], got {}", self.age));
        }
        let sib_sp = u32::try_from(self.sib_sp)
            .map_err(|_| format!("SibSp must be a non-negative integer, got {}", self.sib_sp))?;
        let parch = u32::try_from(self.parch)
            .map_err(|_| format!("Parch must be a non-negative integer, got {}", self.parch))?;
        if !self.fare.is_finite() || self.fare < 0.0 {
            return Err(format!("Fare must be non-negative, got {}", self.fare));
        }
        let embarked = Embarked::parse(&self.embarked).ok_or_else(|| {
            format!("Embarked must be one of 'C', 'Q', 'S', got '{}'", self.embarked)
        })?;

        Ok(ValidatedPassenger {
            pclass,
            sex,
            age: self.age,
            sib_sp,
            parch,
            fare: self.fare,
            embarked,
        })
    }
}

/// Predicted label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Survival {
    NotSurvived = 0,
    Survived = 1,
}

impl Survival {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotSurvived => "Not survived",
            Self::Survived => "Survived",
        }
    }

    /// Numeric label used for metric and span attributes
    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Result of one successful inference
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub label: Survival,
    /// `[not_survived, survived]`
    pub probabilities: [f64; 2],
    pub confidence: f64,
    pub processing_time: Duration,
}

impl PredictionOutcome {
    /// Build an outcome from a probability pair; label is the argmax
    pub fn from_probabilities(probabilities: [f64; 2], processing_time: Duration) -> Self {
        let [not_survived, survived] = probabilities;
        let label = if survived > not_survived {
            Survival::Survived
        } else {
            Survival::NotSurvived
        };
        Self {
            label,
            probabilities,
            confidence: not_survived.max(survived),
            processing_time,
        }
    }
}

/// `POST /predict` response body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: String,
    pub confidence: f64,
    pub processing_time: f64,
    pub probabilities: Probabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probabilities {
    pub not_survived: f64,
    pub survived: f64,
}

impl From<&PredictionOutcome> for PredictionResponse {
    fn from(outcome: &PredictionOutcome) -> Self {
        Self {
            prediction: outcome.label.as_str().to_string(),
            confidence: round3(outcome.confidence),
            processing_time: round3(outcome.processing_time.as_secs_f64()),
            probabilities: Probabilities {
                not_survived: round3(outcome.probabilities[0]),
                survived: round3(outcome.probabilities[1]),
            },
        }
    }
}
