use std::{fmt, pin::Pin};

use aigate_contracts::{BackendCall, BackendChatResponse, BackendEmbeddingResponse, ModelEntry};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub mod catalog;
pub mod engine;
pub mod format;
mod ids;
pub mod store;
pub mod stream;
pub mod translate;
pub mod validate;

pub use catalog::ModelCatalog;
pub use engine::{ChatOutcome, ExecutionEngine, RunOutcome};
pub use ids::unix_now;
pub use store::EntityStore;
pub use stream::{ChunkStream, StreamItem};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// The bare message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message)
            | Self::NotFound(message)
            | Self::Backend(message)
            | Self::Store(message)
            | Self::Serialization(message) => message,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid_request_error",
            Self::NotFound(_) => "not_found",
            Self::Backend(_) | Self::Store(_) | Self::Serialization(_) => "server_error",
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, CoreError>> + Send>>;

/// What a backend call produced.
pub enum BackendResponse {
    Chat(BackendChatResponse),
    Embedding(BackendEmbeddingResponse),
    Stream(ByteStream),
}

impl BackendResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat(_) => "chat",
            Self::Embedding(_) => "embedding",
            Self::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(response) => f.debug_tuple("Chat").field(response).finish(),
            Self::Embedding(response) => f.debug_tuple("Embedding").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn run(&self, call: BackendCall) -> Result<BackendResponse, CoreError>;
}

/// Flat string-keyed document namespace with prefix listing.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn put(&self, key: &str, value: String) -> Result<(), CoreError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CoreError>;
    async fn delete(&self, key: &str) -> Result<(), CoreError>;
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ModelEntry>, CoreError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
    };

    use aigate_contracts::{BackendCall, BackendChatResponse, Usage};
    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;

    #[derive(Default, Clone)]
    pub struct MemoryKv {
        inner: Arc<Mutex<BTreeMap<String, String>>>,
    }

    impl MemoryKv {
        pub fn raw(&self, key: &str) -> Option<String> {
            self.inner.lock().expect("kv lock").get(key).cloned()
        }

        pub fn keys(&self) -> Vec<String> {
            self.inner.lock().expect("kv lock").keys().cloned().collect()
        }
    }

    #[async_trait]
    impl KvStore for MemoryKv {
        async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
            Ok(self.raw(key))
        }

        async fn put(&self, key: &str, value: String) -> Result<(), CoreError> {
            self.inner.lock().expect("kv lock").insert(key.to_string(), value);
            Ok(())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, CoreError> {
            Ok(self.keys().into_iter().filter(|key| key.starts_with(prefix)).collect())
        }

        async fn delete(&self, key: &str) -> Result<(), CoreError> {
            self.inner.lock().expect("kv lock").remove(key);
            Ok(())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum BackendBehavior {
        Reply,
        Fail,
    }

    /// Records every call; replies with a fixed text or a two-frame stream.
    pub struct RecordingBackend {
        behavior: BackendBehavior,
        calls: Mutex<Vec<BackendCall>>,
    }

    impl RecordingBackend {
        pub fn new(behavior: BackendBehavior) -> Self {
            Self { behavior, calls: Mutex::new(Vec::new()) }
        }

        pub fn calls(&self) -> Vec<BackendCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl InferenceBackend for RecordingBackend {
        async fn run(&self, call: BackendCall) -> Result<BackendResponse, CoreError> {
            let stream = call.options.is_stream();
            let embedding = call.chat_options().is_none();
            self.calls.lock().expect("calls lock").push(call);
            if self.behavior == BackendBehavior::Fail {
                return Err(CoreError::Backend("inference failed".to_string()));
            }
            if embedding {
                return Ok(BackendResponse::Embedding(aigate_contracts::BackendEmbeddingResponse {
                    shape: vec![1, 2],
                    data: vec![vec![0.5, -1.0]],
                }));
            }
            if stream {
                let frames = vec![
                    Ok(Bytes::from_static(b"data: {\"response\":\"he\"}\n\n")),
                    Ok(Bytes::from_static(b"data: {\"response\":\"llo\"}\n\n")),
                    Ok(Bytes::from_static(b"data: [DONE]\n\n")),
                ];
                return Ok(BackendResponse::Stream(Box::pin(futures::stream::iter(frames))));
            }
            Ok(BackendResponse::Chat(BackendChatResponse {
                response: Some("hello from backend".to_string()),
                usage: Some(Usage { prompt_tokens: 3, completion_tokens: 4, total_tokens: 7 }),
                tool_calls: None,
            }))
        }
    }
}
