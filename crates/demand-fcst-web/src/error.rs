//! HTTP error type shared by the JSON API and the HTML form.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;

use demand_fcst_core::ForecastError;

/// Numeric codes for failures that do not originate in the pipeline.
pub mod codes {
    pub const BAD_REQUEST: i32 = 1;
    pub const NOT_FOUND: i32 = 20;
    pub const PAYLOAD_TOO_LARGE: i32 = 21;
    pub const INTERNAL: i32 = 99;
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub kind: String,
    pub message: String,
    /// Items dropped before the run failed, shown next to the error.
    pub skipped: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorDetail<'a> {
    code: i32,
    #[serde(rename = "type")]
    kind: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    skipped: &'a [String],
}

fn is_empty(items: &&[String]) -> bool {
    items.is_empty()
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: i32,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            code,
            kind: kind.into(),
            message: message.into(),
            skipped: Vec::new(),
        }
    }

    pub fn bad_request(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, kind, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, "not_found", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL,
            "internal_error",
            message,
        )
    }

    pub fn from_multipart(err: axum::extract::multipart::MultipartError) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            Self::new(
                status,
                codes::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "The uploaded file exceeds the size limit",
            )
        } else {
            Self::new(
                StatusCode::BAD_REQUEST,
                codes::BAD_REQUEST,
                "multipart_error",
                format!("Failed to read multipart field: {}", err.body_text()),
            )
        }
    }

    /// Render as a standalone HTML page with a single error box.
    pub fn into_html(self) -> Response {
        let body = crate::html::error_page(&self.message, &self.skipped);
        (self.status, Html(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                kind: &self.kind,
                message: &self.message,
                skipped: &self.skipped,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ForecastError> for ApiError {
    fn from(err: ForecastError) -> Self {
        let status = match &err {
            ForecastError::NoForecastableItems { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            e if e.is_user_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "forecast failed");
        }

        let skipped = match &err {
            ForecastError::NoForecastableItems { skipped } => skipped.clone(),
            _ => Vec::new(),
        };
        Self {
            status,
            code: err.to_code(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            skipped,
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!(error = %err, "forecast worker failed");
        Self::internal("The forecast worker stopped unexpectedly")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err: ApiError = ForecastError::MissingColumns {
            missing: vec!["Date".into()],
        }
        .into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, 3);
        assert_eq!(err.kind, "missing_columns");

        let err: ApiError = ForecastError::NoForecastableItems {
            skipped: vec!["A".into()],
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.skipped, vec!["A".to_string()]);

        let err: ApiError = ForecastError::ComputationError("boom".into()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_not_found_response_status() {
        let err = ApiError::not_found("Download not found or expired");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
