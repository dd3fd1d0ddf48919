use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::error;
use thiserror::Error;

use crate::models::ErrorBody;

/// Failures surfaced by the vote tally service.
#[derive(Error, Debug)]
pub enum PollError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Invalid option")]
    InvalidOption(String),

    #[error("Storage unavailable")]
    StorageUnavailable(#[from] sqlx::Error),
}

impl PollError {
    pub fn status(&self) -> StatusCode {
        match self {
            PollError::InvalidRequest(_) | PollError::InvalidOption(_) => StatusCode::BAD_REQUEST,
            PollError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            PollError::StorageUnavailable(e) => {
                error!("Storage failure while handling poll request: {}", e);
                ErrorBody {
                    error: self.to_string(),
                    details: Some(e.to_string()),
                }
            }
            _ => ErrorBody {
                error: self.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Failures observed by the client widget and its backends.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network failure: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Server rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Vote was not accepted")]
    NotAccepted,

    #[error("Unknown option: {0}")]
    UnknownOption(String),

    #[error("Local storage I/O error: {0}")]
    StorageIo(#[from] std::io::Error),

    #[error("Local storage holds malformed data: {0}")]
    StorageFormat(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {message}")]
    Invalid { key: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        assert_eq!(
            PollError::InvalidRequest("Missing poll or option".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PollError::InvalidOption("bob".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_errors_map_to_server_error() {
        let err = PollError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Storage unavailable");
    }
}
