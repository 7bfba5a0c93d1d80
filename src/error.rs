use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failures raised inside the engine layer.
///
/// These never reach a caller of [`crate::Converter::convert`]; the facade
/// collapses every variant into [`ConversionFailed`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{tool} is not available. {hint}")]
    ToolUnavailable { tool: String, hint: String },

    #[error("{tool} did not finish within {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("No conversion path from {input} to {output}")]
    UnsupportedPair { input: String, output: String },

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{backend} failed: {detail}")]
    BackendFailure { backend: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn unavailable(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        EngineError::ToolUnavailable {
            tool: tool.into(),
            hint: hint.into(),
        }
    }

    pub fn backend(backend: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        EngineError::BackendFailure {
            backend: backend.into(),
            detail: detail.to_string(),
        }
    }

    pub fn unsupported(input: impl std::fmt::Display, output: impl std::fmt::Display) -> Self {
        EngineError::UnsupportedPair {
            input: input.to_string(),
            output: output.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// The only error a conversion caller ever sees.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Conversion failed: {message}")]
pub struct ConversionFailed {
    pub message: String,
    /// The failure came from a backend tool that is not installed.
    pub tool_missing: bool,
}

impl ConversionFailed {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            tool_missing: false,
        }
    }
}

impl From<EngineError> for ConversionFailed {
    fn from(err: EngineError) -> Self {
        Self {
            message: err.to_string(),
            tool_missing: matches!(err, EngineError::ToolUnavailable { .. }),
        }
    }
}

/// Errors surfaced by the HTTP handlers.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("No file provided")]
    NoFileProvided,

    #[error("{0}")]
    ConversionFailed(#[from] ConversionFailed),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            AppError::NoFileProvided => StatusCode::BAD_REQUEST,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ConversionFailed(e) if e.tool_missing => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ConversionFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
