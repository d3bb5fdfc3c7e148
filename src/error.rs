use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

use crate::pipeline::PredictionError;
use crate::telemetry::ResourceQueryError;

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Request body failed domain validation
    Validation(String),
    /// Body could not be decoded; never reaches the prediction pipeline
    InvalidBody { status: StatusCode, message: String },
    /// Classifier or internal failure
    Internal(String),
    /// Host resource query failed
    ResourceUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Validation error: {}", msg),
            Self::InvalidBody { message, .. } => write!(f, "Invalid request body: {}", message),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
            Self::ResourceUnavailable(msg) => write!(f, "Resource unavailable: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidBody { status, .. } => *status,
            Self::Internal(_) | Self::ResourceUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::Internal(msg) | Self::ResourceUnavailable(msg) => msg,
            Self::InvalidBody { message, .. } => message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "detail": self.message(),
            "error": {
                "message": self.message(),
                "type": error_type_name(&self),
            }
        }));

        (self.status(), body).into_response()
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::Validation(_) => "validation_error",
        AppError::InvalidBody { .. } => "invalid_body",
        AppError::Internal(_) => "internal_error",
        AppError::ResourceUnavailable(_) => "resource_unavailable",
    }
}

impl From<PredictionError> for AppError {
    fn from(err: PredictionError) -> Self {
        match err {
            PredictionError::Validation(msg) => Self::Validation(msg),
            e @ PredictionError::Inference(_) => Self::Internal(e.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<ResourceQueryError> for AppError {
    fn from(err: ResourceQueryError) -> Self {
        Self::ResourceUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
