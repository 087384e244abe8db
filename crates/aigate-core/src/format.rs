use aigate_contracts::{
    BackendChatResponse, BackendEmbeddingResponse, BackendToolCall, ChatCompletion, ChatRole,
    CompletionChoice, CompletionMessage, EmbeddingList, EmbeddingObject, EmbeddingUsage,
    EmbeddingVector, EncodingFormat, ToolCall, ToolCallFunction,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde_json::Value;

use crate::{
    CoreError,
    ids::{new_id, unix_now},
};

/// Wraps a non-streaming backend result as a single-choice chat completion.
pub fn format_completion(
    response: BackendChatResponse,
    model: &str,
) -> Result<ChatCompletion, CoreError> {
    let tool_calls = response
        .tool_calls
        .filter(|calls| !calls.is_empty())
        .map(|calls| calls.into_iter().map(to_openai_tool_call).collect::<Vec<_>>());
    let content = match (response.response, &tool_calls) {
        (Some(text), _) if !text.is_empty() => text,
        (_, Some(_)) => String::new(),
        _ => return Err(CoreError::Backend("backend returned no response text".to_string())),
    };

    Ok(ChatCompletion {
        id: format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()),
        object: "chat.completion".to_string(),
        created: unix_now(),
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: CompletionMessage { role: ChatRole::Assistant, content, tool_calls },
            logprobs: None,
            finish_reason: "stop".to_string(),
        }],
        usage: response.usage.unwrap_or_default(),
    })
}

fn to_openai_tool_call(call: BackendToolCall) -> ToolCall {
    let arguments = match call.arguments {
        Value::String(arguments) => arguments,
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    };
    ToolCall {
        id: new_id("call"),
        kind: "function".to_string(),
        function: ToolCallFunction { name: call.name, arguments },
    }
}

/// Little-endian f32 bytes, standard alphabet.
pub fn encode_base64_f32(vector: &[f32]) -> String {
    let bytes: Vec<u8> = vector.iter().flat_map(|value| value.to_le_bytes()).collect();
    STANDARD.encode(bytes)
}

/// Whitespace word count over all inputs.
pub fn estimate_prompt_tokens(texts: &[String]) -> u32 {
    texts.iter().map(|text| text.split_whitespace().count()).sum::<usize>() as u32
}

pub fn format_embeddings(
    response: BackendEmbeddingResponse,
    model: &str,
    encoding: EncodingFormat,
    prompt_tokens: u32,
) -> EmbeddingList {
    let data = response
        .data
        .into_iter()
        .enumerate()
        .map(|(index, vector)| EmbeddingObject {
            object: "embedding".to_string(),
            index: index as u32,
            embedding: match encoding {
                EncodingFormat::Float => EmbeddingVector::Float(vector),
                EncodingFormat::Base64 => EmbeddingVector::Base64(encode_base64_f32(&vector)),
            },
        })
        .collect();

    EmbeddingList {
        object: "list".to_string(),
        data,
        model: model.to_string(),
        usage: EmbeddingUsage { prompt_tokens, total_tokens: prompt_tokens },
    }
}
