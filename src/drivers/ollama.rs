//! Ollama chat API 驱动 — 本地推理服务的请求/响应格式转换
//!
//! Ollama chat API driver. Notable differences from hosted backends:
//! - Requests go to `/api/chat`; streams are NDJSON, one object per line.
//! - Text streams as incremental `message.content` fragments with no block
//!   structure, so tool calls can only be told apart after the fact.
//! - Tool calls arrive under `message.tool_calls` with arguments already
//!   parsed into an object; there is no call id.
//! - Sampling options nest under `options`; the token budget is
//!   `num_predict`.
//! - Usage arrives once, on the final chunk, as `prompt_eval_count` and
//!   `eval_count`.

use serde_json::{json, Map, Value};

use crate::types::{
    FinishReason, GenerateRequest, GenerateResponse, Part, Role, ToolDeclaration, UsageMetadata,
};

use super::{default_tool_schema, render_system};

/// Backend identifier used in errors and logs.
pub const NAME: &str = "ollama";

/// Build the `/api/chat` request body.
///
/// `tools_enabled` reflects the adapter's current tool-support belief; when
/// false the payload is tool-free regardless of what the request declares.
pub fn build_chat_payload(
    request: &GenerateRequest,
    model: &str,
    tools_enabled: bool,
    stream: bool,
) -> Value {
    let mut messages: Vec<Value> = Vec::new();

    if let Some(system) = render_system(request.system_instruction.as_ref()) {
        messages.push(json!({"role": "system", "content": system}));
    }

    for message in &request.messages {
        if message.has_function_response() && !tools_enabled {
            continue;
        }
        if message.role == Role::System {
            let text = message.text();
            if !text.is_empty() {
                messages.push(json!({"role": "system", "content": text}));
            }
            continue;
        }

        let role = if message.role == Role::Model {
            "assistant"
        } else {
            "user"
        };
        let mut text = String::new();
        let mut calls: Vec<Value> = Vec::new();
        let mut results: Vec<Value> = Vec::new();
        for part in &message.parts {
            match part {
                Part::Text { text: fragment } => text.push_str(fragment),
                Part::FunctionCall { name, args, .. } => {
                    if tools_enabled {
                        calls.push(json!({
                            "function": {"name": name, "arguments": Value::Object(args.clone())}
                        }));
                    }
                }
                Part::FunctionResponse { response, .. } => {
                    let content = serde_json::to_string(&Value::Object(response.clone()))
                        .unwrap_or_default();
                    results.push(json!({"role": "tool", "content": content}));
                }
            }
        }
        if !text.is_empty() || !calls.is_empty() {
            let mut turn = json!({"role": role, "content": text});
            if !calls.is_empty() {
                turn["tool_calls"] = Value::Array(calls);
            }
            messages.push(turn);
        }
        messages.extend(results);
    }

    let mut body = json!({"model": model, "messages": messages, "stream": stream});

    if tools_enabled && request.declares_tools() {
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(tools.iter().map(tool_to_value).collect());
        }
    }

    let mut options = Map::new();
    if let Some(temperature) = request.options.temperature {
        options.insert("temperature".to_string(), json!(temperature));
    }
    if let Some(max_tokens) = request.options.max_tokens {
        options.insert("num_predict".to_string(), json!(max_tokens));
    }
    if !options.is_empty() {
        body["options"] = Value::Object(options);
    }

    body
}

fn tool_to_value(decl: &ToolDeclaration) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": decl.name,
            "description": decl.description.clone().unwrap_or_default(),
            "parameters": decl.parameters.clone().unwrap_or_else(default_tool_schema),
        }
    })
}

/// Build the `/api/embed` request body.
pub fn build_embed_payload(model: &str, input: &str) -> Value {
    json!({"model": model, "input": input})
}

/// Parse a non-streaming `/api/chat` response.
pub fn parse_chat_response(body: &Value) -> GenerateResponse {
    let mut parts: Vec<Part> = Vec::new();
    if let Some(text) = body.pointer("/message/content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
    }
    if let Some(calls) = body.pointer("/message/tool_calls").and_then(|v| v.as_array()) {
        parts.extend(calls.iter().filter_map(parse_tool_call));
    }

    let finish_reason = body
        .get("done_reason")
        .and_then(|v| v.as_str())
        .map(normalize_done_reason);
    let usage = usage_from_counts(body);

    GenerateResponse::from_parts(parts, finish_reason, usage)
}

/// Parse the first vector out of an `/api/embed` response.
pub fn parse_embed_response(body: &Value) -> Option<Vec<f32>> {
    let vector = body
        .pointer("/embeddings/0")
        .or_else(|| body.get("embedding"))?
        .as_array()?;
    Some(
        vector
            .iter()
            .filter_map(|v| v.as_f64())
            .map(|f| f as f32)
            .collect(),
    )
}

/// One decoded NDJSON line of a streaming chat response.
#[derive(Debug, Clone, Default)]
pub struct ChatChunk {
    pub text: String,
    pub calls: Vec<Part>,
    pub done: bool,
    pub done_reason: Option<FinishReason>,
    pub prompt_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    /// Set when the server streamed an error object instead of content.
    pub error: Option<String>,
}

/// Parse one NDJSON chunk of a streaming response.
pub fn parse_stream_chunk(value: &Value) -> ChatChunk {
    let mut chunk = ChatChunk {
        error: value.get("error").and_then(|v| v.as_str()).map(String::from),
        ..ChatChunk::default()
    };
    if let Some(text) = value.pointer("/message/content").and_then(|v| v.as_str()) {
        chunk.text = text.to_string();
    }
    if let Some(calls) = value.pointer("/message/tool_calls").and_then(|v| v.as_array()) {
        chunk.calls = calls.iter().filter_map(parse_tool_call).collect();
    }
    chunk.done = value.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
    chunk.done_reason = value
        .get("done_reason")
        .and_then(|v| v.as_str())
        .map(normalize_done_reason);
    chunk.prompt_tokens = value.get("prompt_eval_count").and_then(Value::as_u64);
    chunk.output_tokens = value.get("eval_count").and_then(Value::as_u64);
    chunk
}

fn parse_tool_call(call: &Value) -> Option<Part> {
    let name = call.pointer("/function/name").and_then(|v| v.as_str())?;
    let args = match call.pointer("/function/arguments") {
        Some(Value::Object(map)) => map.clone(),
        // Some server builds ship arguments as a JSON string.
        Some(Value::String(raw)) => serde_json::from_str::<Map<String, Value>>(raw).unwrap_or_default(),
        _ => Map::new(),
    };
    Some(Part::function_call(name, args))
}

pub(crate) fn normalize_done_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::MaxTokens,
        other => FinishReason::Other(other.to_string()),
    }
}

fn usage_from_counts(value: &Value) -> UsageMetadata {
    UsageMetadata::totaled(
        value.get("prompt_eval_count").and_then(Value::as_u64).unwrap_or(0),
        value.get("eval_count").and_then(Value::as_u64).unwrap_or(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    fn weather_tool() -> ToolDeclaration {
        ToolDeclaration::new("get_weather")
            .description("Current weather for a city")
            .parameters(json!({
                "type": "object",
                "properties": {"city": {"type": "string"}}
            }))
    }

    #[test]
    fn test_build_chat_payload_basic() {
        let request = GenerateRequest::new(vec![Message::user("Hello")])
            .system("Be terse.")
            .temperature(0.5)
            .max_tokens(64);
        let body = build_chat_payload(&request, "llama3.2", true, false);

        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be terse.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["options"]["temperature"], 0.5);
        assert_eq!(body["options"]["num_predict"], 64);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_options_omitted_when_unset() {
        let request = GenerateRequest::new(vec![Message::user("Hello")]);
        let body = build_chat_payload(&request, "llama3.2", true, true);
        assert!(body.get("options").is_none());
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_tools_forwarded_with_default_schema() {
        let request = GenerateRequest::new(vec![Message::user("hi")])
            .tools(vec![ToolDeclaration::new("noop"), weather_tool()]);
        let body = build_chat_payload(&request, "llama3.2", true, false);

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["type"], "function");
        assert_eq!(tools[0]["function"]["name"], "noop");
        assert_eq!(tools[0]["function"]["parameters"]["type"], "object");
        assert_eq!(
            tools[1]["function"]["parameters"]["properties"]["city"]["type"],
            "string"
        );
    }

    #[test]
    fn test_empty_tool_list_sends_no_tools() {
        let request = GenerateRequest::new(vec![Message::user("hi")]).tools(vec![]);
        let body = build_chat_payload(&request, "llama3.2", true, false);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_disabled_tools_strip_calls_and_drop_result_turns() {
        let mut args = Map::new();
        args.insert("city".to_string(), json!("Tokyo"));
        let mut response = Map::new();
        response.insert("temp_c".to_string(), json!(21));

        let request = GenerateRequest::new(vec![
            Message::user("Weather in Tokyo?"),
            Message::new(Role::Model, vec![Part::function_call("get_weather", args)]),
            Message::tool(vec![Part::function_response(None, response)]),
        ])
        .tools(vec![weather_tool()]);

        let body = build_chat_payload(&request, "llama3.2", false, false);
        let messages = body["messages"].as_array().unwrap();

        // The call-only model turn and the tool turn both disappear.
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_enabled_tools_round_trip_call_and_result() {
        let mut args = Map::new();
        args.insert("city".to_string(), json!("Tokyo"));
        let mut response = Map::new();
        response.insert("temp_c".to_string(), json!(21));

        let request = GenerateRequest::new(vec![
            Message::new(
                Role::Model,
                vec![Part::text("Checking."), Part::function_call("get_weather", args)],
            ),
            Message::tool(vec![Part::function_response(None, response)]),
        ]);
        let body = build_chat_payload(&request, "llama3.2", true, false);
        let messages = body["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "assistant");
        assert_eq!(messages[0]["content"], "Checking.");
        assert_eq!(
            messages[0]["tool_calls"][0]["function"]["name"],
            "get_weather"
        );
        assert_eq!(messages[1]["role"], "tool");
        assert!(messages[1]["content"].as_str().unwrap().contains("temp_c"));
    }

    #[test]
    fn test_blank_turns_are_omitted() {
        let request = GenerateRequest::new(vec![
            Message::new(Role::User, vec![]),
            Message::new(Role::User, vec![Part::text("")]),
            Message::user("real content"),
        ]);
        let body = build_chat_payload(&request, "llama3.2", true, false);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["content"], "real content");
    }

    #[test]
    fn test_parse_chat_response_with_tool_calls() {
        let body = json!({
            "model": "llama3.2",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "get_weather", "arguments": {"city": "Tokyo"}}}
                ]
            },
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 26,
            "eval_count": 12
        });
        let response = parse_chat_response(&body);

        let calls = response.function_calls();
        assert_eq!(calls.len(), 1);
        match calls[0] {
            Part::FunctionCall { name, args, id } => {
                assert_eq!(name, "get_weather");
                assert_eq!(args["city"], "Tokyo");
                assert!(id.is_none());
            }
            other => panic!("expected function call, got {other:?}"),
        }
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
        assert_eq!(response.usage.prompt_tokens, 26);
        assert_eq!(response.usage.total_tokens, 38);
    }

    #[test]
    fn test_parse_chat_response_defaults_missing_counts() {
        let body = json!({"message": {"role": "assistant", "content": "hi"}, "done": true});
        let response = parse_chat_response(&body);
        assert_eq!(response.text(), "hi");
        assert_eq!(response.usage, UsageMetadata::default());
        assert!(response.finish_reason().is_none());
    }

    #[test]
    fn test_normalize_done_reason() {
        assert_eq!(normalize_done_reason("stop"), FinishReason::Stop);
        assert_eq!(normalize_done_reason("length"), FinishReason::MaxTokens);
        assert_eq!(
            normalize_done_reason("unload"),
            FinishReason::Other("unload".to_string())
        );
    }

    #[test]
    fn test_parse_stream_chunk_terminal() {
        let value = json!({
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 10,
            "eval_count": 34
        });
        let chunk = parse_stream_chunk(&value);
        assert!(chunk.done);
        assert_eq!(chunk.done_reason, Some(FinishReason::Stop));
        assert_eq!(chunk.prompt_tokens, Some(10));
        assert_eq!(chunk.output_tokens, Some(34));
    }

    #[test]
    fn test_parse_stream_chunk_error_object() {
        let chunk = parse_stream_chunk(&json!({"error": "model not found"}));
        assert_eq!(chunk.error.as_deref(), Some("model not found"));
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_tool_call_with_string_arguments() {
        let value = json!({
            "message": {
                "content": "",
                "tool_calls": [
                    {"function": {"name": "noop", "arguments": "{\"flag\": true}"}}
                ]
            }
        });
        let chunk = parse_stream_chunk(&value);
        match &chunk.calls[0] {
            Part::FunctionCall { args, .. } => assert_eq!(args["flag"], true),
            other => panic!("expected function call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_embed_response() {
        let body = json!({"embeddings": [[0.1, 0.2, 0.3]]});
        let vector = parse_embed_response(&body).unwrap();
        assert_eq!(vector.len(), 3);
        assert!((vector[1] - 0.2).abs() < 1e-6);

        let legacy = json!({"embedding": [0.5]});
        assert_eq!(parse_embed_response(&legacy).unwrap(), vec![0.5]);

        assert!(parse_embed_response(&json!({})).is_none());
    }
}
