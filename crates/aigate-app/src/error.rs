use aigate_core::CoreError;
use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

pub const CHAT_FAILED: &str = "Chat completion failed";
pub const EMBEDDING_FAILED: &str = "Embedding failed";
pub const ASSISTANT_FAILED: &str = "Assistant operation failed";
pub const THREAD_FAILED: &str = "Thread operation failed";
pub const RUN_FAILED: &str = "Run creation failed";

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// An error rendered as `{"error":{"message","type":"api_error","details"?}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    pub fn method_not_allowed() -> Self {
        Self::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    }

    /// Client errors keep their message; server errors get `failure` with the
    /// underlying text in `details`.
    pub fn from_core(error: CoreError, failure: &'static str) -> Self {
        match error {
            CoreError::Validation(message) => Self::bad_request(message),
            CoreError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            other => {
                warn!(event = "request.failed", failure, error = %other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, failure).with_details(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: ErrorDetail {
                message: self.message,
                kind: "api_error".to_string(),
                details: self.details,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid JSON body").with_details(rejection.body_text())
    }
}

/// `axum::Json` with rejections rendered in the API error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

pub(crate) trait OrApiError<T> {
    fn or_api_error(self, failure: &'static str) -> Result<T, ApiError>;
}

impl<T> OrApiError<T> for Result<T, CoreError> {
    fn or_api_error(self, failure: &'static str) -> Result<T, ApiError> {
        self.map_err(|error| ApiError::from_core(error, failure))
    }
}
