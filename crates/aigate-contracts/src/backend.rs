//! Request and response shapes of the Workers AI inference backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatMessage, Usage};

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendFunction {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: BackendFunction,
}

impl BackendTool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<Value>,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: BackendFunction {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendChatOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<BackendTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendEmbeddingOptions {
    pub text: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum BackendOptions {
    Chat(BackendChatOptions),
    Embedding(BackendEmbeddingOptions),
}

impl BackendOptions {
    pub fn is_stream(&self) -> bool {
        match self {
            Self::Chat(options) => options.stream.unwrap_or(false),
            Self::Embedding(_) => false,
        }
    }
}

/// One `run(model, options)` invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendCall {
    pub model: String,
    pub options: BackendOptions,
}

impl BackendCall {
    pub fn chat_options(&self) -> Option<&BackendChatOptions> {
        match &self.options {
            BackendOptions::Chat(options) => Some(options),
            BackendOptions::Embedding(_) => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct BackendToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendChatResponse {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub tool_calls: Option<Vec<BackendToolCall>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendEmbeddingResponse {
    #[serde(default)]
    pub shape: Vec<usize>,
    pub data: Vec<Vec<f32>>,
}

/// Payload of one `data: {...}` frame of the backend's streaming output.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct BackendStreamFrame {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
}
