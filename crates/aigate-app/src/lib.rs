use std::sync::Arc;

use aigate_clients_kv::{InMemoryKvStore, WorkersKvStore};
use aigate_clients_workers::{MockBackend, WorkersAiClient, WorkersModelCatalog};
use aigate_contracts::{
    Assistant, AssistantCreateRequest, ChatCompletion, ChatCompletionChunk, ChatCompletionsRequest,
    DeletionStatus, EmbeddingList, EmbeddingsRequest, ModelEntry, ModelList, Run,
    RunCreateRequest, Thread, ThreadCreateRequest, ThreadWithMessages,
};
use aigate_core::{
    CatalogSource, CoreError, EntityStore, ExecutionEngine, InferenceBackend, KvStore,
    ModelCatalog, unix_now,
};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use tracing::{info, warn};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

mod auth;
pub mod config;
pub mod error;
mod handlers;

use error::{ErrorDetail, ErrorResponse};
use handlers::{assistants, chat, method_not_allowed, models, not_found, threads};

#[derive(OpenApi)]
#[openapi(
    paths(
        models::list_models,
        models::search_models,
        chat::create_chat_completion,
        chat::create_embeddings,
        assistants::list_assistants,
        assistants::create_assistant,
        assistants::get_assistant,
        assistants::modify_assistant,
        assistants::delete_assistant,
        threads::list_threads,
        threads::create_thread,
        threads::get_thread,
        threads::modify_thread,
        threads::delete_thread,
        threads::create_run
    ),
    components(
        schemas(
            ErrorResponse,
            ErrorDetail,
            ModelEntry,
            ModelList,
            ChatCompletionsRequest,
            ChatCompletion,
            ChatCompletionChunk,
            EmbeddingsRequest,
            EmbeddingList,
            Assistant,
            AssistantCreateRequest,
            Thread,
            ThreadCreateRequest,
            ThreadWithMessages,
            Run,
            RunCreateRequest,
            DeletionStatus
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "models", description = "Model catalog"),
        (name = "chat", description = "Chat completions"),
        (name = "embeddings", description = "Text embeddings"),
        (name = "assistants", description = "Assistant CRUD"),
        (name = "threads", description = "Threads and synchronous runs")
    )
)]
struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    engine: Arc<ExecutionEngine>,
    catalog: Arc<ModelCatalog>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(engine: ExecutionEngine, catalog: ModelCatalog, api_key: &str) -> Self {
        Self { engine: Arc::new(engine), catalog: Arc::new(catalog), api_key: Arc::from(api_key) }
    }

    /// Workers AI and its catalog when credentials are set, the mock backend
    /// and the built-in catalog otherwise. The store is Workers KV only when a
    /// namespace and credentials are both present.
    pub fn from_config(config: &config::AppConfig) -> Result<Self, CoreError> {
        let timeout = config.backend_timeout_seconds;
        let account = config.cloudflare_account();

        let (backend, catalog) = match &account {
            Some(account) => {
                let backend: Arc<dyn InferenceBackend> = Arc::new(WorkersAiClient::new(
                    account.clone(),
                    timeout,
                    Some(config.backend_max_inflight),
                )?);
                let source: Arc<dyn CatalogSource> =
                    Arc::new(WorkersModelCatalog::new(account.clone(), timeout, unix_now())?);
                info!(event = "backend.selected", backend = "workers_ai", account_id = %account.account_id);
                (backend, ModelCatalog::new(Some(source)))
            }
            None => {
                let backend: Arc<dyn InferenceBackend> = Arc::new(MockBackend::new());
                warn!(
                    event = "backend.selected",
                    backend = "mock",
                    "CF_ACCOUNT_ID or CF_API_KEY unset; serving mock completions"
                );
                (backend, ModelCatalog::builtin())
            }
        };

        let kv: Arc<dyn KvStore> = match (&config.kv_namespace_id, &account) {
            (Some(namespace_id), Some(account)) => {
                info!(event = "store.selected", store = "workers_kv", namespace_id = %namespace_id);
                Arc::new(WorkersKvStore::new(account.clone(), namespace_id.as_str(), timeout)?)
            }
            (Some(_), None) => {
                warn!(
                    event = "store.selected",
                    store = "memory",
                    "CF_KV_NAMESPACE_ID set without credentials; state is process-local"
                );
                Arc::new(InMemoryKvStore::new())
            }
            (None, _) => {
                info!(event = "store.selected", store = "memory");
                Arc::new(InMemoryKvStore::new())
            }
        };

        if config.api_key.is_empty() {
            warn!(event = "auth.disabled", "API_KEY is empty; every protected route answers 401");
        }

        let engine = ExecutionEngine::new(backend, EntityStore::new(kv), config.default_model.as_str());
        Ok(Self::new(engine, catalog, &config.api_key))
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/models", get(models::list_models).fallback(method_not_allowed))
        .route(
            "/v1/chat/completions",
            post(chat::create_chat_completion).fallback(method_not_allowed),
        )
        .route("/v1/embeddings", post(chat::create_embeddings).fallback(method_not_allowed))
        .route(
            "/v1/assistants",
            get(assistants::list_assistants)
                .post(assistants::create_assistant)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/assistants/{assistant_id}",
            get(assistants::get_assistant)
                .post(assistants::modify_assistant)
                .delete(assistants::delete_assistant)
                .fallback(method_not_allowed),
        )
        .route(
            "/v1/threads",
            get(threads::list_threads).post(threads::create_thread).fallback(method_not_allowed),
        )
        .route(
            "/v1/threads/{thread_id}",
            get(threads::get_thread)
                .post(threads::modify_thread)
                .delete(threads::delete_thread)
                .fallback(method_not_allowed),
        )
        .route("/v1/threads/{thread_id}/runs", post(threads::create_run).fallback(method_not_allowed))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer));

    Router::new()
        .route("/models/search", get(models::search_models).fallback(method_not_allowed))
        .merge(protected)
        .fallback(not_found)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}
