pub mod prediction;

pub use prediction::{
    Embarked, PredictionOutcome, PredictionRequest, PredictionResponse, Probabilities, Sex,
    Survival, ValidatedPassenger,
};
