use aigate_contracts::{
    ChatCompletion, DeletionStatus, ListResponse, RunCreateRequest, Thread,
    ThreadCreateRequest, ThreadPatch, ThreadWithMessages,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use tracing::{info, instrument};

use crate::{
    AppState,
    error::{ApiError, ApiJson, ErrorResponse, OrApiError, RUN_FAILED, THREAD_FAILED},
    handlers::chat::outcome_response,
};

#[utoipa::path(
    get,
    path = "/v1/threads",
    responses((status = 200, description = "All threads, newest first", body = ListResponse<Thread>)),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state))]
pub async fn list_threads(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Thread>>, ApiError> {
    let threads = state.engine().store().list_threads().await.or_api_error(THREAD_FAILED)?;
    Ok(Json(threads))
}

#[utoipa::path(
    post,
    path = "/v1/threads",
    request_body = ThreadCreateRequest,
    responses(
        (status = 201, description = "Created thread with its seed messages", body = ThreadWithMessages),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state, request))]
pub async fn create_thread(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ThreadCreateRequest>,
) -> Result<(StatusCode, Json<ThreadWithMessages>), ApiError> {
    let thread = state.engine().store().create_thread(request).await.or_api_error(THREAD_FAILED)?;
    Ok((StatusCode::CREATED, Json(thread)))
}

#[utoipa::path(
    get,
    path = "/v1/threads/{thread_id}",
    params(("thread_id" = String, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Thread with its messages", body = ThreadWithMessages),
        (status = 404, description = "Unknown thread", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state))]
pub async fn get_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<ThreadWithMessages>, ApiError> {
    let thread = state
        .engine()
        .store()
        .get_thread_with_messages(&thread_id)
        .await
        .or_api_error(THREAD_FAILED)?;
    Ok(Json(thread))
}

#[utoipa::path(
    post,
    path = "/v1/threads/{thread_id}",
    params(("thread_id" = String, Path, description = "Thread id")),
    request_body(
        content = ThreadCreateRequest,
        description = "`metadata` and `tool_resources` are applied when present"
    ),
    responses(
        (status = 200, description = "Modified thread", body = Thread),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown thread", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state, patch))]
pub async fn modify_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    ApiJson(patch): ApiJson<ThreadPatch>,
) -> Result<Json<Thread>, ApiError> {
    let thread =
        state.engine().store().modify_thread(&thread_id, patch).await.or_api_error(THREAD_FAILED)?;
    Ok(Json(thread))
}

#[utoipa::path(
    delete,
    path = "/v1/threads/{thread_id}",
    params(("thread_id" = String, Path, description = "Thread id")),
    responses(
        (status = 200, description = "Deletion acknowledgement", body = DeletionStatus),
        (status = 404, description = "Unknown thread", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state))]
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<DeletionStatus>, ApiError> {
    let deleted =
        state.engine().store().delete_thread(&thread_id).await.or_api_error(THREAD_FAILED)?;
    Ok(Json(deleted))
}

#[utoipa::path(
    post,
    path = "/v1/threads/{thread_id}/runs",
    params(("thread_id" = String, Path, description = "Thread id")),
    request_body = RunCreateRequest,
    responses(
        (status = 200, description = "The run's chat completion, or its chunk stream when `stream` is set", body = ChatCompletion),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Unknown thread or assistant", body = ErrorResponse),
        (status = 500, description = "Backend failure; the run is stored as failed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "threads"
)]
#[instrument(skip(state, request), fields(assistant_id = ?request.assistant_id))]
pub async fn create_run(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    ApiJson(request): ApiJson<RunCreateRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.engine().create_run(&thread_id, request).await.or_api_error(RUN_FAILED)?;
    info!(event = "run.responded", run_id = %outcome.run.id, status = ?outcome.run.status);
    Ok(outcome_response(outcome.response))
}
