//! Application error taxonomy and HTTP response mapping
//!
//! Every error that can reach a request boundary is one of these kinds.
//! Storage errors never leak driver messages to clients; upstream (LLM,
//! webhook) failures are recovered where they happen and only logged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Ingestion/request validation failure — surfaced verbatim, no retry
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid credential
    #[error("unauthorized")]
    Unauthorized,

    /// Missing resource (funnel, dashboard, session, ...)
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Duplicate key (e.g. second setup attempt)
    #[error("{0}")]
    Conflict(String),

    /// LLM or webhook call failed — usually recovered locally, surfaced only
    /// from interactive endpoints like /ai/chat
    #[error("{0}")]
    Upstream(String),

    /// Database error — logged with detail, surfaced as a generic message
    #[error("internal server error")]
    Storage(#[from] anyhow::Error),

    /// Encryption envelope corrupt or wrong key
    #[error("encrypted field is unreadable")]
    Format,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Format => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Storage errors carry driver detail we must not echo to clients.
        if let AppError::Storage(ref inner) = self {
            tracing::error!("storage error: {inner:#}");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<duckdb::Error> for AppError {
    fn from(e: duckdb::Error) -> Self {
        AppError::Storage(anyhow::Error::new(e))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Storage(anyhow::Error::new(e))
    }
}

pub type AppResult<T> = Result<T, AppError>;
