use aigate_contracts::{
    BackendCall, BackendChatResponse, BackendEmbeddingResponse, BackendOptions, ChatRole, Usage,
};
use aigate_core::{BackendResponse, CoreError, InferenceBackend};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

const EMBEDDING_DIMENSIONS: usize = 8;

/// Offline backend: echoes the last user message, word by word when streaming.
#[derive(Debug, Default, Clone)]
pub struct MockBackend;

impl MockBackend {
    pub fn new() -> Self {
        Self
    }
}

fn reply_text(options: &aigate_contracts::BackendChatOptions) -> String {
    let last_user = options
        .messages
        .iter()
        .rev()
        .find(|message| message.role == ChatRole::User)
        .map(|message| message.content.as_str())
        .unwrap_or_default();
    format!("[mock] {last_user}").trim_end().to_string()
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Deterministic unit-length-ish vector derived from the text bytes.
fn mock_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; EMBEDDING_DIMENSIONS];
    for (index, byte) in text.bytes().enumerate() {
        vector[index % EMBEDDING_DIMENSIONS] += f32::from(byte) / 255.0;
    }
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|value| *value /= norm);
    }
    vector
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn run(&self, call: BackendCall) -> Result<BackendResponse, CoreError> {
        match call.options {
            BackendOptions::Embedding(options) => {
                let data: Vec<Vec<f32>> = options.text.iter().map(|text| mock_embedding(text)).collect();
                Ok(BackendResponse::Embedding(BackendEmbeddingResponse {
                    shape: vec![data.len(), EMBEDDING_DIMENSIONS],
                    data,
                }))
            }
            BackendOptions::Chat(options) => {
                let text = reply_text(&options);
                let prompt_tokens =
                    options.messages.iter().map(|message| word_count(&message.content)).sum();
                let usage = Usage {
                    prompt_tokens,
                    completion_tokens: word_count(&text),
                    total_tokens: prompt_tokens + word_count(&text),
                };
                if !options.stream.unwrap_or(false) {
                    return Ok(BackendResponse::Chat(BackendChatResponse {
                        response: Some(text),
                        usage: Some(usage),
                        tool_calls: None,
                    }));
                }

                let mut frames: Vec<Result<Bytes, CoreError>> = text
                    .split_inclusive(' ')
                    .map(|word| {
                        Ok(Bytes::from(format!("data: {}\n\n", json!({ "response": word }))))
                    })
                    .collect();
                frames.push(Ok(Bytes::from(format!(
                    "data: {}\n\n",
                    json!({ "response": "", "usage": usage })
                ))));
                frames.push(Ok(Bytes::from_static(b"data: [DONE]\n\n")));
                Ok(BackendResponse::Stream(Box::pin(futures::stream::iter(frames))))
            }
        }
    }
}
