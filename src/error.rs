//! # Error Handling
//!
//! Custom error types for the transcription pipeline and their conversion to
//! HTTP responses.
//!
//! ## Taxonomy:
//! - **ModelNotReady**: a request arrived before the model finished loading
//! - **DecodeFailure**: the audio payload could not be interpreted
//! - **InferenceFailure**: the engine failed mid-transcription
//! - **NotFound**: unknown path
//!
//! Inference-stage failures are terminal for the request and map to a
//! server-error response carrying the underlying message. Cleanup-stage
//! failures never appear here: the cleanup client absorbs them and the
//! request degrades to raw text.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    /// The inference engine has not been loaded yet
    ModelNotReady,

    /// The audio payload could not be decoded
    DecodeFailure(String),

    /// The inference engine reported an internal fault
    InferenceFailure(String),

    /// Requested path does not exist
    NotFound,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ModelNotReady => write!(f, "Model not loaded"),
            AppError::DecodeFailure(msg) => write!(f, "Failed to decode audio: {}", msg),
            AppError::InferenceFailure(msg) => write!(f, "{}", msg),
            AppError::NotFound => write!(f, "Not found"),
        }
    }
}

/// Converts pipeline errors into the wire error shape `{"error": message}`.
///
/// Everything the inference stage can raise is a server-side condition from
/// the caller's point of view (the clip was accepted but could not be
/// served), so those map to 500. Only unknown paths map to 404.
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = match self {
            AppError::NotFound => actix_web::http::StatusCode::NOT_FOUND,
            _ => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        };

        HttpResponse::build(status).json(json!({
            "error": self.to_string()
        }))
    }
}

/// Any internal engine fault surfaces as `InferenceFailure` with the
/// underlying message, never as a process-level panic.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InferenceFailure(err.to_string())
    }
}

impl From<candle_core::Error> for AppError {
    fn from(err: candle_core::Error) -> Self {
        AppError::InferenceFailure(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ModelNotReady.error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::DecodeFailure("bad header".into()).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::InferenceFailure("boom".into()).error_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::NotFound.error_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_messages_carry_cause() {
        let err = AppError::DecodeFailure("missing RIFF header".into());
        assert!(err.to_string().contains("missing RIFF header"));

        let err: AppError = anyhow::anyhow!("tensor shape mismatch").into();
        assert!(matches!(err, AppError::InferenceFailure(_)));
        assert!(err.to_string().contains("tensor shape mismatch"));
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(AppError::NotFound.to_string(), "Not found");
    }
}
