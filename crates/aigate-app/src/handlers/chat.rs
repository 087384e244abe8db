use aigate_contracts::{ChatCompletion, ChatCompletionsRequest, EmbeddingList, EmbeddingsRequest};
use aigate_core::{ChatOutcome, ChunkStream, StreamItem};
use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response, Sse, sse::Event},
};
use futures::StreamExt;
use tracing::instrument;

use crate::{
    AppState,
    error::{ApiError, ApiJson, CHAT_FAILED, EMBEDDING_FAILED, ErrorResponse, OrApiError},
};

/// SSE body: one `data:` event per chunk, then `data: [DONE]`.
pub(crate) fn sse_response(stream: ChunkStream) -> Response {
    let events = stream.map(|item| match item {
        StreamItem::Chunk(chunk) => Event::default().json_data(chunk),
        StreamItem::Done => Ok(Event::default().data("[DONE]")),
    });
    Sse::new(events).into_response()
}

pub(crate) fn outcome_response(outcome: ChatOutcome) -> Response {
    match outcome {
        ChatOutcome::Completion(completion) => Json(completion).into_response(),
        ChatOutcome::Stream(stream) => sse_response(stream),
    }
}

#[utoipa::path(
    post,
    path = "/v1/chat/completions",
    request_body = ChatCompletionsRequest,
    responses(
        (status = 200, description = "Chat completion, or an SSE stream of chunks when `stream` is set", body = ChatCompletion),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Backend failure", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "chat"
)]
#[instrument(skip(state, request), fields(model = ?request.model, stream = ?request.stream))]
pub async fn create_chat_completion(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatCompletionsRequest>,
) -> Result<Response, ApiError> {
    let outcome = state.engine().chat_completion(request).await.or_api_error(CHAT_FAILED)?;
    Ok(outcome_response(outcome))
}

#[utoipa::path(
    post,
    path = "/v1/embeddings",
    request_body = EmbeddingsRequest,
    responses(
        (status = 200, description = "Embedding list", body = EmbeddingList),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 500, description = "Backend failure", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "embeddings"
)]
#[instrument(skip(state, request), fields(model = ?request.model))]
pub async fn create_embeddings(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmbeddingsRequest>,
) -> Result<Json<EmbeddingList>, ApiError> {
    let catalog = state.catalog().models().await;
    let embeddings =
        state.engine().embeddings(request, &catalog).await.or_api_error(EMBEDDING_FAILED)?;
    Ok(Json(embeddings))
}
