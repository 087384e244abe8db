use std::{future::Future, sync::Arc, time::Instant};

use aigate_contracts::{
    Assistant, BackendCall, BackendEmbeddingOptions, BackendOptions, ChatCompletion,
    ChatCompletionsRequest, EmbeddingList, EmbeddingsRequest, ModelEntry, Run, RunCreateRequest,
    RunError, RunStatus, Usage,
};
use serde_json::Value;
use tracing::{Instrument, info, info_span, warn};

use crate::{
    BackendResponse, CoreError, InferenceBackend,
    format::{estimate_prompt_tokens, format_completion, format_embeddings},
    ids::{new_id, unix_now},
    store::EntityStore,
    stream::{ChunkStream, rechunk},
    translate::{resolve_model_name, translate_chat_request, translate_run},
    validate,
};

pub enum ChatOutcome {
    Completion(ChatCompletion),
    Stream(ChunkStream),
}

impl std::fmt::Debug for ChatOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion(completion) => f.debug_tuple("Completion").field(completion).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// A settled run and what its backend call produced.
#[derive(Debug)]
pub struct RunOutcome {
    pub run: Run,
    pub response: ChatOutcome,
}

pub struct ExecutionEngine {
    backend: Arc<dyn InferenceBackend>,
    store: EntityStore,
    default_model: String,
}

impl ExecutionEngine {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        store: EntityStore,
        default_model: impl Into<String>,
    ) -> Self {
        Self { backend, store, default_model: default_model.into() }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn chat_completion(
        &self,
        request: ChatCompletionsRequest,
    ) -> Result<ChatOutcome, CoreError> {
        let call = translate_chat_request(&request, &self.default_model)?;
        let stream = call.options.is_stream();
        let model = call.model.clone();
        let response = self.run_stage("chat", &model, self.invoke(call)).await?;
        respond(response, stream, &model)
    }

    /// `catalog` decides which model names are embedding models.
    pub async fn embeddings(
        &self,
        request: EmbeddingsRequest,
        catalog: &[ModelEntry],
    ) -> Result<EmbeddingList, CoreError> {
        let model = resolve_model_name(request.model.as_deref(), &self.default_model);
        let Some(input) = request.input.filter(|input| !input.is_null()) else {
            return Err(CoreError::Validation("Model and input are required".to_string()));
        };
        if !catalog.iter().any(|entry| entry.name == model && entry.is_embedding_model()) {
            return Err(CoreError::Validation("Invalid embedding model".to_string()));
        }
        let texts = embedding_texts(&input)?;
        let prompt_tokens = estimate_prompt_tokens(&texts);

        let call = BackendCall {
            model: model.clone(),
            options: BackendOptions::Embedding(BackendEmbeddingOptions { text: texts }),
        };
        match self.run_stage("embeddings", &model, self.invoke(call)).await? {
            BackendResponse::Embedding(response) => Ok(format_embeddings(
                response,
                &model,
                request.encoding_format.unwrap_or_default(),
                prompt_tokens,
            )),
            other => Err(CoreError::Backend(format!(
                "expected embeddings from backend, got {} response",
                other.kind()
            ))),
        }
    }

    /// Creates a run on `thread_id`, executes it and persists its final state.
    ///
    /// Lookups and validation fail before anything is written. Once the run
    /// is stored as `queued`, a backend failure settles it as `failed`.
    pub async fn create_run(
        &self,
        thread_id: &str,
        request: RunCreateRequest,
    ) -> Result<RunOutcome, CoreError> {
        let Some(assistant_id) =
            request.assistant_id.as_deref().filter(|assistant_id| !assistant_id.is_empty())
        else {
            return Err(CoreError::Validation("assistant_id is required".to_string()));
        };
        validate::validate_instructions(request.instructions.as_deref())?;
        if let Some(metadata) = &request.metadata {
            validate::validate_metadata(metadata)?;
        }
        let thread = self.store.get_thread(thread_id).await?;
        let assistant = self.store.get_assistant(assistant_id).await?;

        let mut run = Run {
            id: new_id("run"),
            object: "thread.run".to_string(),
            created_at: unix_now(),
            thread_id: thread.id.clone(),
            assistant_id: assistant.id.clone(),
            status: RunStatus::Queued,
            model: resolve_model_name(
                Some(request.model.as_deref().unwrap_or(&assistant.model)),
                &self.default_model,
            ),
            instructions: request.instructions,
            temperature: request.temperature,
            top_p: request.top_p,
            max_completion_tokens: request.max_completion_tokens.or(request.max_tokens),
            stream: request.stream,
            truncation_strategy: request.truncation_strategy,
            tool_resources: request.tool_resources.unwrap_or_else(|| thread.tool_resources.clone()),
            metadata: request.metadata.unwrap_or_default(),
            usage: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
        };
        self.store.put_run(&run).await?;
        info!(event = "run.queued", run_id = %run.id, thread_id = %run.thread_id, model = %run.model);

        let executed = self.run_stage("run", &run.model, self.execute_run(&run, &assistant)).await;
        match executed {
            Ok((response, usage)) => {
                run.status = RunStatus::Completed;
                run.completed_at = Some(unix_now());
                run.usage = usage;
                self.store.put_run(&run).await?;
                info!(event = "run.completed", run_id = %run.id);
                Ok(RunOutcome { run, response })
            }
            Err(error) => {
                run.status = RunStatus::Failed;
                run.failed_at = Some(unix_now());
                run.last_error = Some(RunError {
                    code: error.code().to_string(),
                    message: error.message().to_string(),
                });
                if let Err(store_error) = self.store.put_run(&run).await {
                    warn!(event = "run.persist_failed", run_id = %run.id, error = %store_error);
                }
                warn!(event = "run.failed", run_id = %run.id, error = %error);
                Err(error)
            }
        }
    }

    async fn execute_run(
        &self,
        run: &Run,
        assistant: &Assistant,
    ) -> Result<(ChatOutcome, Option<Usage>), CoreError> {
        let history = self.store.thread_messages(&run.thread_id).await?;
        let call = translate_run(run, assistant, &history);
        let stream = call.options.is_stream();
        let response = self.invoke(call).await?;
        let outcome = respond(response, stream, &run.model)?;
        let usage = match &outcome {
            ChatOutcome::Completion(completion) => Some(completion.usage),
            ChatOutcome::Stream(_) => None,
        };
        Ok((outcome, usage))
    }

    async fn invoke(&self, call: BackendCall) -> Result<BackendResponse, CoreError> {
        let started = Instant::now();
        let result = self.backend.run(call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(response) => {
                info!(event = "backend.call.completed", kind = response.kind(), elapsed_ms)
            }
            Err(error) => warn!(event = "backend.call.failed", error = %error, elapsed_ms),
        }
        result
    }

    async fn run_stage<T>(
        &self,
        stage: &'static str,
        model: &str,
        work: impl Future<Output = Result<T, CoreError>>,
    ) -> Result<T, CoreError> {
        let span = info_span!("pipeline_stage", stage, model = %model);
        work.instrument(span).await
    }
}

fn respond(response: BackendResponse, stream: bool, model: &str) -> Result<ChatOutcome, CoreError> {
    match (response, stream) {
        (BackendResponse::Stream(upstream), true) => {
            Ok(ChatOutcome::Stream(rechunk(upstream, model)))
        }
        (BackendResponse::Chat(response), false) => {
            format_completion(response, model).map(ChatOutcome::Completion)
        }
        (other, _) => Err(CoreError::Backend(format!(
            "unexpected {} response from backend (stream requested: {stream})",
            other.kind()
        ))),
    }
}

fn embedding_texts(input: &Value) -> Result<Vec<String>, CoreError> {
    let invalid = || CoreError::Validation("Invalid input format".to_string());
    match input {
        Value::String(text) if !text.is_empty() => Ok(vec![text.clone()]),
        Value::Array(items) if !items.is_empty() => items
            .iter()
            .map(|item| match item {
                Value::String(text) if !text.is_empty() => Ok(text.clone()),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}
