//! Assistant, thread and run documents on top of a [`KvStore`].

use std::sync::Arc;

use aigate_contracts::{
    Assistant, AssistantCreateRequest, AssistantPatch, DeletionStatus, ListResponse, Patch, Run,
    Thread, ThreadCreateRequest, ThreadMessage, ThreadPatch, ThreadWithMessages,
};
use futures::future::try_join_all;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info};

use crate::{
    CoreError, KvStore,
    ids::{new_id, unix_now},
    translate::resolve_model_name,
    validate,
};

pub const ASSISTANT_PREFIX: &str = "assistant:";
pub const THREAD_PREFIX: &str = "thread:";
pub const RUN_PREFIX: &str = "run:";
const MESSAGES_SUFFIX: &str = ":messages";

pub fn assistant_key(id: &str) -> String {
    format!("{ASSISTANT_PREFIX}{id}")
}

pub fn thread_key(id: &str) -> String {
    format!("{THREAD_PREFIX}{id}")
}

pub fn thread_messages_key(id: &str) -> String {
    format!("{THREAD_PREFIX}{id}{MESSAGES_SUFFIX}")
}

pub fn run_key(id: &str) -> String {
    format!("{RUN_PREFIX}{id}")
}

fn assistant_not_found() -> CoreError {
    CoreError::NotFound("Assistant not found".to_string())
}

fn thread_not_found() -> CoreError {
    CoreError::NotFound("Thread not found".to_string())
}

fn required<T>(field: &str, patch: Patch<T>, target: &mut T) -> Result<(), CoreError> {
    match patch {
        Patch::Absent => Ok(()),
        Patch::Null => Err(CoreError::Validation(format!("{field} cannot be null"))),
        Patch::Set(value) => {
            *target = value;
            Ok(())
        }
    }
}

#[derive(Clone)]
pub struct EntityStore {
    kv: Arc<dyn KvStore>,
}

impl EntityStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CoreError> {
        let Some(raw) = self.kv.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| CoreError::Serialization(format!("corrupt document {key}: {error}")))
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CoreError> {
        self.kv.put(key, serde_json::to_string(value)?).await
    }

    /// Fetches every key under `prefix` that `accept` admits, skipping
    /// documents that vanished or no longer deserialize.
    pub(crate) async fn list_json<T: DeserializeOwned>(
        &self,
        prefix: &str,
        accept: impl Fn(&str) -> bool,
    ) -> Result<Vec<T>, CoreError> {
        let keys: Vec<String> =
            self.kv.list(prefix).await?.into_iter().filter(|key| accept(key)).collect();
        let documents = try_join_all(keys.iter().map(|key| self.kv.get(key))).await?;

        Ok(keys
            .iter()
            .zip(documents)
            .filter_map(|(key, raw)| {
                let raw = raw?;
                match serde_json::from_str(&raw) {
                    Ok(value) => Some(value),
                    Err(error) => {
                        debug!(event = "store.list.skip", key = %key, error = %error);
                        None
                    }
                }
            })
            .collect())
    }

    pub async fn create_assistant(
        &self,
        request: AssistantCreateRequest,
        default_model: &str,
    ) -> Result<Assistant, CoreError> {
        let Some(model) = request.model.as_deref().filter(|model| !model.trim().is_empty()) else {
            return Err(CoreError::Validation("Model is required".to_string()));
        };
        validate::validate_name(request.name.as_deref())?;
        validate::validate_description(request.description.as_deref())?;
        validate::validate_instructions(request.instructions.as_deref())?;
        if let Some(metadata) = &request.metadata {
            validate::validate_metadata(metadata)?;
        }
        if let Some(tools) = &request.tools {
            validate::validate_tool_count(tools.len())?;
        }

        let assistant = Assistant {
            id: new_id("asst"),
            object: "assistant".to_string(),
            created_at: unix_now(),
            model: resolve_model_name(Some(model), default_model),
            name: request.name.filter(|name| !name.is_empty()),
            description: request.description.filter(|description| !description.is_empty()),
            instructions: request.instructions.filter(|instructions| !instructions.is_empty()),
            tools: request.tools.unwrap_or_default(),
            tool_resources: request.tool_resources.unwrap_or_default(),
            metadata: request.metadata.unwrap_or_default(),
            temperature: request.temperature,
            top_p: request.top_p,
            response_format: request.response_format.unwrap_or_default(),
            truncation_strategy: request.truncation_strategy,
        };
        self.put_json(&assistant_key(&assistant.id), &assistant).await?;
        info!(event = "assistant.created", assistant_id = %assistant.id, model = %assistant.model);
        Ok(assistant)
    }

    pub async fn get_assistant(&self, id: &str) -> Result<Assistant, CoreError> {
        self.get_json(&assistant_key(id)).await?.ok_or_else(assistant_not_found)
    }

    /// Applies only the keys present in `patch`; everything is validated before the write.
    pub async fn modify_assistant(
        &self,
        id: &str,
        patch: AssistantPatch,
        default_model: &str,
    ) -> Result<Assistant, CoreError> {
        let mut assistant = self.get_assistant(id).await?;

        validate::validate_name(patch.name.as_set().map(String::as_str))?;
        validate::validate_description(patch.description.as_set().map(String::as_str))?;
        validate::validate_instructions(patch.instructions.as_set().map(String::as_str))?;
        if let Some(metadata) = patch.metadata.as_set() {
            validate::validate_metadata(metadata)?;
        }
        if let Some(tools) = patch.tools.as_set() {
            validate::validate_tool_count(tools.len())?;
        }

        required("model", patch.model, &mut assistant.model)?;
        assistant.model = resolve_model_name(Some(&assistant.model), default_model);
        patch.name.apply_to(&mut assistant.name);
        patch.description.apply_to(&mut assistant.description);
        patch.instructions.apply_to(&mut assistant.instructions);
        required("tools", patch.tools, &mut assistant.tools)?;
        required("tool_resources", patch.tool_resources, &mut assistant.tool_resources)?;
        required("metadata", patch.metadata, &mut assistant.metadata)?;
        patch.temperature.apply_to(&mut assistant.temperature);
        patch.top_p.apply_to(&mut assistant.top_p);
        match patch.response_format {
            Patch::Absent => {}
            Patch::Null => assistant.response_format = Default::default(),
            Patch::Set(format) => assistant.response_format = format,
        }
        patch.truncation_strategy.apply_to(&mut assistant.truncation_strategy);

        self.put_json(&assistant_key(id), &assistant).await?;
        info!(event = "assistant.modified", assistant_id = %id);
        Ok(assistant)
    }

    pub async fn list_assistants(&self) -> Result<ListResponse<Assistant>, CoreError> {
        let mut assistants: Vec<Assistant> = self.list_json(ASSISTANT_PREFIX, |_| true).await?;
        assistants.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(ListResponse::new(assistants))
    }

    pub async fn delete_assistant(&self, id: &str) -> Result<DeletionStatus, CoreError> {
        let key = assistant_key(id);
        if self.kv.get(&key).await?.is_none() {
            return Err(assistant_not_found());
        }
        self.kv.delete(&key).await?;
        info!(event = "assistant.deleted", assistant_id = %id);
        Ok(DeletionStatus {
            id: id.to_string(),
            object: "assistant.deleted".to_string(),
            deleted: true,
        })
    }

    pub async fn create_thread(
        &self,
        request: ThreadCreateRequest,
    ) -> Result<ThreadWithMessages, CoreError> {
        if let Some(metadata) = &request.metadata {
            validate::validate_metadata(metadata)?;
        }

        let created_at = unix_now();
        let thread = Thread {
            id: new_id("thread"),
            object: "thread".to_string(),
            created_at,
            metadata: request.metadata.unwrap_or_default(),
            tool_resources: request.tool_resources.unwrap_or_default(),
        };
        let messages: Vec<ThreadMessage> = request
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|message| ThreadMessage {
                id: new_id("msg"),
                object: "thread.message".to_string(),
                created_at,
                message,
            })
            .collect();

        self.put_json(&thread_key(&thread.id), &thread).await?;
        if !messages.is_empty() {
            self.put_json(&thread_messages_key(&thread.id), &messages).await?;
        }
        info!(event = "thread.created", thread_id = %thread.id, messages = messages.len());
        Ok(ThreadWithMessages { thread, messages })
    }

    pub async fn get_thread(&self, id: &str) -> Result<Thread, CoreError> {
        self.get_json(&thread_key(id)).await?.ok_or_else(thread_not_found)
    }

    /// Missing message lists read as empty.
    pub async fn thread_messages(&self, id: &str) -> Result<Vec<ThreadMessage>, CoreError> {
        Ok(self.get_json(&thread_messages_key(id)).await?.unwrap_or_default())
    }

    pub async fn get_thread_with_messages(
        &self,
        id: &str,
    ) -> Result<ThreadWithMessages, CoreError> {
        let thread = self.get_thread(id).await?;
        let messages = self.thread_messages(id).await?;
        Ok(ThreadWithMessages { thread, messages })
    }

    pub async fn modify_thread(&self, id: &str, patch: ThreadPatch) -> Result<Thread, CoreError> {
        let mut thread = self.get_thread(id).await?;
        if let Some(metadata) = patch.metadata.as_set() {
            validate::validate_metadata(metadata)?;
        }
        required("metadata", patch.metadata, &mut thread.metadata)?;
        required("tool_resources", patch.tool_resources, &mut thread.tool_resources)?;

        self.put_json(&thread_key(id), &thread).await?;
        info!(event = "thread.modified", thread_id = %id);
        Ok(thread)
    }

    pub async fn list_threads(&self) -> Result<ListResponse<Thread>, CoreError> {
        let mut threads: Vec<Thread> =
            self.list_json(THREAD_PREFIX, |key| !key.ends_with(MESSAGES_SUFFIX)).await?;
        threads.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(ListResponse::new(threads))
    }

    pub async fn delete_thread(&self, id: &str) -> Result<DeletionStatus, CoreError> {
        let key = thread_key(id);
        if self.kv.get(&key).await?.is_none() {
            return Err(thread_not_found());
        }
        let messages_key = thread_messages_key(id);
        futures::try_join!(self.kv.delete(&key), self.kv.delete(&messages_key))?;
        info!(event = "thread.deleted", thread_id = %id);
        Ok(DeletionStatus { id: id.to_string(), object: "thread.deleted".to_string(), deleted: true })
    }

    pub async fn put_run(&self, run: &Run) -> Result<(), CoreError> {
        self.put_json(&run_key(&run.id), run).await
    }

    pub async fn get_run(&self, id: &str) -> Result<Run, CoreError> {
        self.get_json(&run_key(id))
            .await?
            .ok_or_else(|| CoreError::NotFound("Run not found".to_string()))
    }
}
