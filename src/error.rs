use std::time::Duration;

use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JWT signing error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebDriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    /// Page or balance indicator never appeared. Ends the run.
    #[error("timed out after {waited:?} waiting for {what}")]
    StartupWaitTimeout { what: String, waited: Duration },

    #[error("balance indicator unreadable: {0:?}")]
    BalanceUnreadable(String),

    #[error("ratio undefined for price {0}")]
    DivisionUndefined(f64),

    #[error("alert dispatch failed: {0}")]
    Dispatch(String),

    #[error("snapshot publish failed: {0}")]
    Publish(String),

    #[error("stats unavailable: {0}")]
    Stats(String),
}

/// Why a single listing was dropped from its cycle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItemExtractionError {
    #[error("price element missing")]
    MissingPrice,

    #[error("price text {0:?} is not a number")]
    MalformedPrice(String),

    #[error("converted price {0} is not positive")]
    NonPositivePrice(f64),

    #[error("link missing")]
    MissingLink,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::StartupWaitTimeout { .. })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Stats(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
