use aigate_contracts::{
    Assistant, AssistantCreateRequest, AssistantPatch, DeletionStatus, ListResponse,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use tracing::instrument;

use crate::{
    AppState,
    error::{ASSISTANT_FAILED, ApiError, ApiJson, ErrorResponse, OrApiError},
};

#[utoipa::path(
    get,
    path = "/v1/assistants",
    responses((status = 200, description = "All assistants, newest first", body = ListResponse<Assistant>)),
    security(("bearer" = [])),
    tag = "assistants"
)]
#[instrument(skip(state))]
pub async fn list_assistants(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Assistant>>, ApiError> {
    let assistants = state.engine().store().list_assistants().await.or_api_error(ASSISTANT_FAILED)?;
    Ok(Json(assistants))
}

#[utoipa::path(
    post,
    path = "/v1/assistants",
    request_body = AssistantCreateRequest,
    responses(
        (status = 201, description = "Created assistant", body = Assistant),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "assistants"
)]
#[instrument(skip(state, request), fields(model = ?request.model))]
pub async fn create_assistant(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<AssistantCreateRequest>,
) -> Result<(StatusCode, Json<Assistant>), ApiError> {
    let engine = state.engine();
    let assistant = engine
        .store()
        .create_assistant(request, engine.default_model())
        .await
        .or_api_error(ASSISTANT_FAILED)?;
    Ok((StatusCode::CREATED, Json(assistant)))
}

#[utoipa::path(
    get,
    path = "/v1/assistants/{assistant_id}",
    params(("assistant_id" = String, Path, description = "Assistant id")),
    responses(
        (status = 200, description = "Assistant", body = Assistant),
        (status = 404, description = "Unknown assistant", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "assistants"
)]
#[instrument(skip(state))]
pub async fn get_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> Result<Json<Assistant>, ApiError> {
    let assistant =
        state.engine().store().get_assistant(&assistant_id).await.or_api_error(ASSISTANT_FAILED)?;
    Ok(Json(assistant))
}

#[utoipa::path(
    post,
    path = "/v1/assistants/{assistant_id}",
    params(("assistant_id" = String, Path, description = "Assistant id")),
    request_body(
        content = AssistantCreateRequest,
        description = "Only the fields present in the body are applied; `null` clears a nullable field"
    ),
    responses(
        (status = 200, description = "Modified assistant", body = Assistant),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown assistant", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "assistants"
)]
#[instrument(skip(state, patch))]
pub async fn modify_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
    ApiJson(patch): ApiJson<AssistantPatch>,
) -> Result<Json<Assistant>, ApiError> {
    let engine = state.engine();
    let assistant = engine
        .store()
        .modify_assistant(&assistant_id, patch, engine.default_model())
        .await
        .or_api_error(ASSISTANT_FAILED)?;
    Ok(Json(assistant))
}

#[utoipa::path(
    delete,
    path = "/v1/assistants/{assistant_id}",
    params(("assistant_id" = String, Path, description = "Assistant id")),
    responses(
        (status = 200, description = "Deletion acknowledgement", body = DeletionStatus),
        (status = 404, description = "Unknown assistant", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "assistants"
)]
#[instrument(skip(state))]
pub async fn delete_assistant(
    State(state): State<AppState>,
    Path(assistant_id): Path<String>,
) -> Result<Json<DeletionStatus>, ApiError> {
    let deleted =
        state.engine().store().delete_assistant(&assistant_id).await.or_api_error(ASSISTANT_FAILED)?;
    Ok(Json(deleted))
}
