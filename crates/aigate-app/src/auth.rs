use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::{AppState, error::ApiError};

/// Rejects requests whose `Authorization: Bearer` token is not the shared key.
pub async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if is_authorized(state.api_key(), request.headers()) {
        return next.run(request).await;
    }
    debug!(event = "auth.rejected", path = %request.uri().path());
    ApiError::unauthorized().into_response()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// An empty key authorizes nothing.
pub(crate) fn is_authorized(api_key: &str, headers: &HeaderMap) -> bool {
    if api_key.is_empty() {
        return false;
    }
    bearer_token(headers).is_some_and(|token| {
        token.len() == api_key.len() && bool::from(token.as_bytes().ct_eq(api_key.as_bytes()))
    })
}
