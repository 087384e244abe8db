pub mod assistants;
pub mod chat;
pub mod models;
pub mod threads;

use crate::error::ApiError;

pub async fn not_found() -> ApiError {
    ApiError::not_found()
}

pub async fn method_not_allowed() -> ApiError {
    ApiError::method_not_allowed()
}
