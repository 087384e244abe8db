//! Mapping of OpenAI-shaped requests onto backend `run(model, options)` calls.

use aigate_contracts::{
    Assistant, BackendCall, BackendChatOptions, BackendOptions, BackendTool,
    ChatCompletionsRequest, ChatMessage, ResponseFormat, ResponseFormatSpec, Run, ThreadMessage,
    Tool,
};
use serde_json::{Map, Value, json};

use crate::{CoreError, validate};

/// Backend temperature used when the client sends none or OpenAI's default of 1.
pub const NEUTRAL_BACKEND_TEMPERATURE: f64 = 0.6;
pub const JSON_RESPONSE_INSTRUCTION: &str = "Respond using JSON format";

const OPENAI_TEMPERATURE_MAX: f64 = 2.0;
const TEMPERATURE_SCALE: f64 = 2.5;

/// Strips a `#task` suffix; empty names fall back to `default_model`.
pub fn resolve_model_name(model: Option<&str>, default_model: &str) -> String {
    let name = model
        .map(|model| model.split_once('#').map_or(model, |(name, _)| name))
        .unwrap_or_default();
    if name.is_empty() { default_model.to_string() } else { name.to_string() }
}

pub fn map_temperature(temperature: Option<f64>) -> f64 {
    match temperature {
        None => NEUTRAL_BACKEND_TEMPERATURE,
        Some(value) if value == 1.0 => NEUTRAL_BACKEND_TEMPERATURE,
        Some(value) => {
            let scaled = value.clamp(0.0, OPENAI_TEMPERATURE_MAX) * TEMPERATURE_SCALE;
            (scaled * 10.0).round() / 10.0
        }
    }
}

/// Sampling knobs shared by chat completions and runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplingParams {
    pub stream: Option<bool>,
    pub max_completion_tokens: Option<u32>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub seed: Option<i64>,
    pub frequency_penalty: Option<f64>,
    pub presence_penalty: Option<f64>,
}

impl From<&ChatCompletionsRequest> for SamplingParams {
    fn from(request: &ChatCompletionsRequest) -> Self {
        Self {
            stream: request.stream,
            max_completion_tokens: request.max_completion_tokens,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            seed: request.seed,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        }
    }
}

/// Builds backend options without messages or tools.
pub fn map_sampling(params: &SamplingParams) -> BackendChatOptions {
    BackendChatOptions {
        stream: params.stream,
        max_tokens: params.max_completion_tokens.or(params.max_tokens),
        temperature: Some(map_temperature(params.temperature)),
        top_p: params.top_p,
        seed: params.seed,
        repetition_penalty: None,
        frequency_penalty: params.frequency_penalty,
        presence_penalty: params.presence_penalty,
        messages: Vec::new(),
        tools: None,
        tool_choice: None,
    }
}

pub fn translate_tool(tool: &Tool) -> BackendTool {
    match tool {
        Tool::CodeInterpreter => BackendTool::function(
            "code_interpreter",
            "Executes Python code",
            Some(single_string_parameter("code", "Python code to execute")),
        ),
        Tool::FileSearch { .. } => BackendTool::function(
            "file_search",
            "Searches through files",
            Some(single_string_parameter("query", "Query to search for")),
        ),
        Tool::Function { function } => BackendTool::function(
            function.name.clone(),
            function.description.clone().unwrap_or_default(),
            function.parameters.clone(),
        ),
    }
}

pub fn translate_tools(tools: Option<&[Tool]>) -> Option<Vec<BackendTool>> {
    tools.map(|tools| tools.iter().map(translate_tool).collect())
}

fn single_string_parameter(name: &str, description: &str) -> Value {
    let mut properties = Map::new();
    properties.insert(name.to_string(), json!({ "type": "string", "description": description }));
    json!({
        "type": "object",
        "properties": properties,
        "required": [name],
    })
}

/// Rewrites the legacy `function_call: {"name": ..}` into the `tool_choice` shape.
pub fn legacy_function_call_to_tool_choice(function_call: &Value) -> Value {
    match function_call.get("name").and_then(Value::as_str) {
        Some(name) => json!({ "type": "function", "function": { "name": name } }),
        None => function_call.clone(),
    }
}

fn effective_tools(request: &ChatCompletionsRequest) -> Option<Vec<Tool>> {
    request.tools.clone().or_else(|| {
        request.functions.as_ref().map(|functions| {
            functions.iter().cloned().map(|function| Tool::Function { function }).collect()
        })
    })
}

fn effective_tool_choice(request: &ChatCompletionsRequest) -> Option<Value> {
    request
        .tool_choice
        .clone()
        .or_else(|| request.function_call.as_ref().map(legacy_function_call_to_tool_choice))
}

/// System instruction requested by a JSON response format, if any.
pub fn json_mode_instruction(format: &ResponseFormat) -> Option<String> {
    match format {
        ResponseFormat::Mode(_) | ResponseFormat::Spec(ResponseFormatSpec::Text) => None,
        ResponseFormat::Spec(ResponseFormatSpec::JsonObject) => {
            Some(JSON_RESPONSE_INSTRUCTION.to_string())
        }
        ResponseFormat::Spec(ResponseFormatSpec::JsonSchema { json_schema }) => {
            match json_schema.as_ref().and_then(|spec| spec.get("schema")) {
                Some(schema) => Some(format!(
                    "{JSON_RESPONSE_INSTRUCTION} matching this JSON schema: {schema}"
                )),
                None => Some(JSON_RESPONSE_INSTRUCTION.to_string()),
            }
        }
    }
}

pub fn translate_chat_request(
    request: &ChatCompletionsRequest,
    default_model: &str,
) -> Result<BackendCall, CoreError> {
    if request.messages.is_empty() {
        return Err(CoreError::Validation("messages must not be empty".to_string()));
    }
    let tools = effective_tools(request);
    if let Some(tools) = &tools {
        validate::validate_tool_count(tools.len())?;
    }

    let mut options = map_sampling(&SamplingParams::from(request));
    options.messages = request.messages.clone();
    if let Some(instruction) = request.response_format.as_ref().and_then(json_mode_instruction) {
        options.messages.push(ChatMessage::system(instruction));
    }
    options.tools = translate_tools(tools.as_deref());
    options.tool_choice = effective_tool_choice(request);

    Ok(BackendCall {
        model: resolve_model_name(request.model.as_deref(), default_model),
        options: BackendOptions::Chat(options),
    })
}

/// The backend has no truncation control; a `last_messages` count travels as its seed.
pub fn truncation_seed(run: &Run, assistant: &Assistant) -> Option<i64> {
    run.truncation_strategy
        .as_ref()
        .or(assistant.truncation_strategy.as_ref())
        .and_then(|strategy| strategy.last_messages)
        .map(i64::from)
}

/// Builds the backend call for a run. `run.model` is already resolved.
pub fn translate_run(run: &Run, assistant: &Assistant, history: &[ThreadMessage]) -> BackendCall {
    let params = SamplingParams {
        stream: run.stream,
        max_completion_tokens: run.max_completion_tokens,
        temperature: run.temperature.or(assistant.temperature),
        top_p: run.top_p.or(assistant.top_p),
        seed: truncation_seed(run, assistant),
        ..SamplingParams::default()
    };
    let mut options = map_sampling(&params);

    let mut messages = Vec::with_capacity(history.len() + 2);
    let instructions = run
        .instructions
        .as_deref()
        .or(assistant.instructions.as_deref())
        .filter(|instructions| !instructions.trim().is_empty());
    if let Some(instructions) = instructions {
        messages.push(ChatMessage::system(instructions));
    }
    if let Some(instruction) = json_mode_instruction(&assistant.response_format) {
        messages.push(ChatMessage::system(instruction));
    }
    messages.extend(history.iter().map(|entry| entry.message.clone()));
    options.messages = messages;

    if !assistant.tools.is_empty() {
        options.tools = translate_tools(Some(&assistant.tools));
    }

    BackendCall { model: run.model.clone(), options: BackendOptions::Chat(options) }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use aigate_contracts::{ChatRole, FunctionDefinition, RunStatus, TruncationStrategy};

    use super::*;

    const DEFAULT_MODEL: &str = "@cf/meta/llama-3-8b-instruct";

    fn chat_request(body: Value) -> ChatCompletionsRequest {
        serde_json::from_value(body).expect("chat request")
    }

    fn options(call: &BackendCall) -> &BackendChatOptions {
        call.chat_options().expect("chat options")
    }

    fn assistant() -> Assistant {
        Assistant {
            id: "asst_1".to_string(),
            object: "assistant".to_string(),
            created_at: 1,
            name: None,
            description: None,
            model: "@cf/meta/llama-3.2-3b-instruct".to_string(),
            instructions: Some("Be brief.".to_string()),
            tools: Vec::new(),
            tool_resources: BTreeMap::new(),
            metadata: BTreeMap::new(),
            temperature: Some(0.4),
            top_p: Some(0.9),
            response_format: ResponseFormat::default(),
            truncation_strategy: Some(TruncationStrategy {
                kind: "last_messages".to_string(),
                last_messages: Some(4),
            }),
        }
    }

    fn run() -> Run {
        Run {
            id: "run_1".to_string(),
            object: "thread.run".to_string(),
            created_at: 1,
            thread_id: "thread_1".to_string(),
            assistant_id: "asst_1".to_string(),
            status: RunStatus::Queued,
            model: "@cf/meta/llama-3.2-3b-instruct".to_string(),
            instructions: None,
            temperature: None,
            top_p: None,
            max_completion_tokens: None,
            stream: None,
            truncation_strategy: None,
            tool_resources: BTreeMap::new(),
            metadata: BTreeMap::new(),
            usage: None,
            completed_at: None,
            failed_at: None,
            last_error: None,
        }
    }

    fn history() -> Vec<ThreadMessage> {
        vec![ThreadMessage {
            id: "msg_1".to_string(),
            object: "thread.message".to_string(),
            created_at: 1,
            message: ChatMessage::new(ChatRole::User, "hi"),
        }]
    }

    #[test]
    fn translated_tools_translate_to_themselves() {
        let tools: Vec<Tool> = serde_json::from_value(json!([
            {"type": "code_interpreter"},
            {"type": "file_search"},
            {"type": "function", "function": {
                "name": "lookup",
                "parameters": {"type": "object", "properties": {"q": {"type": "string"}}}
            }}
        ]))
        .expect("tools");

        for tool in &tools {
            let once = serde_json::to_value(translate_tool(tool)).expect("tool json");
            let canonical: Tool = serde_json::from_value(once.clone()).expect("canonical tool");
            let twice = serde_json::to_value(translate_tool(&canonical)).expect("tool json");
            assert_eq!(twice, once);
        }
    }

    #[test]
    fn model_names_lose_task_suffix_and_fall_back_to_default() {
        assert_eq!(
            resolve_model_name(Some("@cf/baai/bge-base-en-v1.5#text-embeddings"), DEFAULT_MODEL),
            "@cf/baai/bge-base-en-v1.5"
        );
        assert_eq!(resolve_model_name(Some("@cf/x/y"), DEFAULT_MODEL), "@cf/x/y");
        assert_eq!(resolve_model_name(Some(""), DEFAULT_MODEL), DEFAULT_MODEL);
        assert_eq!(resolve_model_name(Some("#only-task"), DEFAULT_MODEL), DEFAULT_MODEL);
        assert_eq!(resolve_model_name(None, DEFAULT_MODEL), DEFAULT_MODEL);
    }

    #[test]
    fn temperature_is_rescaled_onto_backend_range() {
        let cases = [
            (None, 0.6),
            (Some(1.0), 0.6),
            (Some(0.0), 0.0),
            (Some(0.5), 1.3),
            (Some(2.0), 5.0),
            (Some(7.0), 5.0),
            (Some(-1.0), 0.0),
        ];
        for (input, expected) in cases {
            assert_eq!(map_temperature(input), expected, "temperature {input:?}");
        }
    }

    #[test]
    fn max_completion_tokens_wins_over_max_tokens() {
        let call = translate_chat_request(
            &chat_request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "max_tokens": 10,
                "max_completion_tokens": 20,
                "seed": 7,
            })),
            DEFAULT_MODEL,
        )
        .expect("translate");
        let options = options(&call);
        assert_eq!(options.max_tokens, Some(20));
        assert_eq!(options.seed, Some(7));
        assert_eq!(options.repetition_penalty, None);
        assert_eq!(call.model, DEFAULT_MODEL);
    }

    #[test]
    fn builtin_tools_become_function_tools() {
        let tools = translate_tools(Some(&[
            Tool::CodeInterpreter,
            Tool::FileSearch { file_search: None },
            Tool::Function {
                function: FunctionDefinition {
                    name: "lookup".to_string(),
                    description: None,
                    parameters: Some(json!({"type": "object"})),
                },
            },
        ]))
        .expect("tools");

        assert_eq!(tools[0].function.name, "code_interpreter");
        assert_eq!(tools[0].function.description, "Executes Python code");
        let code = &tools[0].function.parameters.as_ref().expect("params")["properties"]["code"];
        assert_eq!(code["description"], "Python code to execute");
        assert_eq!(tools[1].function.name, "file_search");
        assert_eq!(
            tools[1].function.parameters.as_ref().expect("params")["required"],
            json!(["query"])
        );
        assert_eq!(tools[2].function.description, "");
        assert_eq!(tools[2].kind, "function");
        assert_eq!(translate_tools(None), None);
    }

    #[test]
    fn legacy_functions_fill_in_for_tools() {
        let call = translate_chat_request(
            &chat_request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "functions": [{"name": "lookup", "parameters": {"type": "object"}}],
                "function_call": {"name": "lookup"},
            })),
            DEFAULT_MODEL,
        )
        .expect("translate");
        let options = options(&call);
        assert_eq!(options.tools.as_ref().expect("tools")[0].function.name, "lookup");
        assert_eq!(
            options.tool_choice,
            Some(json!({"type": "function", "function": {"name": "lookup"}}))
        );
    }

    #[test]
    fn json_object_format_appends_system_instruction() {
        let call = translate_chat_request(
            &chat_request(json!({
                "messages": [{"role": "user", "content": "hi"}],
                "response_format": {"type": "json_object"},
            })),
            DEFAULT_MODEL,
        )
        .expect("translate");
        let messages = &options(&call).messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1], ChatMessage::system(JSON_RESPONSE_INSTRUCTION));
    }

    #[test]
    fn json_schema_instruction_carries_the_schema() {
        let format: ResponseFormat = serde_json::from_value(json!({
            "type": "json_schema",
            "json_schema": {"name": "x", "schema": {"type": "object"}},
        }))
        .expect("format");
        let instruction = json_mode_instruction(&format).expect("instruction");
        assert!(instruction.starts_with(JSON_RESPONSE_INSTRUCTION));
        assert!(instruction.contains(r#"{"type":"object"}"#));
        assert_eq!(json_mode_instruction(&ResponseFormat::default()), None);
    }

    #[test]
    fn empty_messages_are_rejected() {
        let error = translate_chat_request(&chat_request(json!({"messages": []})), DEFAULT_MODEL)
            .expect_err("empty messages");
        assert!(matches!(error, CoreError::Validation(_)));
    }

    #[test]
    fn run_falls_back_to_assistant_settings() {
        let call = translate_run(&run(), &assistant(), &history());
        let options = options(&call);
        assert_eq!(call.model, "@cf/meta/llama-3.2-3b-instruct");
        assert_eq!(options.temperature, Some(1.0));
        assert_eq!(options.top_p, Some(0.9));
        assert_eq!(options.seed, Some(4));
        assert_eq!(options.messages[0], ChatMessage::system("Be brief."));
        assert_eq!(options.messages[1].content, "hi");
        assert_eq!(options.tools, None);
    }

    #[test]
    fn run_overrides_take_precedence() {
        let mut run = run();
        run.instructions = Some("Be verbose.".to_string());
        run.temperature = Some(0.0);
        run.max_completion_tokens = Some(64);
        run.truncation_strategy =
            Some(TruncationStrategy { kind: "last_messages".to_string(), last_messages: Some(2) });
        let mut assistant = assistant();
        assistant.response_format = ResponseFormat::Spec(ResponseFormatSpec::JsonObject);
        assistant.tools = vec![Tool::CodeInterpreter];

        let call = translate_run(&run, &assistant, &history());
        let options = options(&call);
        assert_eq!(options.temperature, Some(0.0));
        assert_eq!(options.max_tokens, Some(64));
        assert_eq!(options.seed, Some(2));
        let roles: Vec<_> = options.messages.iter().map(|message| message.role).collect();
        assert_eq!(roles, vec![ChatRole::System, ChatRole::System, ChatRole::User]);
        assert_eq!(options.messages[0].content, "Be verbose.");
        assert_eq!(options.messages[1].content, JSON_RESPONSE_INSTRUCTION);
        assert_eq!(options.tools.as_ref().map(Vec::len), Some(1));
    }
}
