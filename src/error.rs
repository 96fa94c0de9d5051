use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::media::reader::StreamError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Request body was not `application/sdp`
    #[error("Unacceptable")]
    UnsupportedMediaType,

    /// Request body could not be read as text
    #[error("{0}")]
    BodyRead(String),

    #[error("Invalid SDP offer: {0}")]
    InvalidOffer(String),

    #[error("WebRTC error: {0}")]
    WebRtcError(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("H.264 stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Sample write failed: {0}")]
    Delivery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Prefix used in the plain-text error body
    fn body_prefix(&self) -> &'static str {
        match self {
            AppError::UnsupportedMediaType => "",
            AppError::BodyRead(_) => "Error1: ",
            _ => "Error2: ",
        }
    }

    /// Coarse category shown to clients when error details are hidden
    pub fn category(&self) -> &'static str {
        match self {
            AppError::UnsupportedMediaType => "unsupported media type",
            AppError::BodyRead(_) => "unreadable body",
            AppError::InvalidOffer(_) => "invalid offer",
            AppError::WebRtcError(_) | AppError::Delivery(_) => "transport error",
            AppError::Timeout(_) => "timeout",
            _ => "internal error",
        }
    }

    /// Build the HTTP response, optionally replacing the error text with its category
    pub fn to_response(&self, expose_details: bool) -> Response {
        let status = self.status_code();
        let detail = if expose_details || matches!(self, AppError::UnsupportedMediaType) {
            self.to_string()
        } else {
            self.category().to_string()
        };
        let body = format!("{}{}", self.body_prefix(), detail);

        if status.is_server_error() {
            tracing::error!(
                error_category = self.category(),
                error_message = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(error_message = %self, "Request rejected");
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            body,
        )
            .into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_response(true)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
