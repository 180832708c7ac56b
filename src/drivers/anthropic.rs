//! Anthropic Messages API 驱动 — 实现 Anthropic 特有的请求/响应格式转换
//!
//! Anthropic Messages API driver. Key differences from the local backend:
//! - System text is a top-level `system` parameter, not part of `messages`.
//! - Content uses typed blocks: `text`, `tool_use`, `tool_result`.
//! - Streaming is SSE with segmented content blocks; tool arguments arrive
//!   as `input_json_delta` fragments between block start and stop.
//! - `max_tokens` is required, so a default is applied when unset.
//! - Tool calls carry ids that must be echoed back as `tool_use_id`.

use serde_json::{json, Map, Value};

use crate::types::{
    FinishReason, GenerateRequest, GenerateResponse, Part, Role, ToolDeclaration, UsageMetadata,
};

use super::{default_tool_schema, render_system};

/// Backend identifier used in errors and logs.
pub const NAME: &str = "anthropic";

/// Version header value required by the Messages API.
pub const API_VERSION: &str = "2023-06-01";

/// Applied when the request sets no output budget; the API rejects requests
/// without `max_tokens`.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Stands in for a correlation id the unified history did not carry.
pub const FALLBACK_CALL_ID: &str = "call_missing_id";

/// Build the `/v1/messages` request body.
pub fn build_messages_payload(
    request: &GenerateRequest,
    model: &str,
    tools_enabled: bool,
    stream: bool,
) -> Value {
    let mut system_parts: Vec<String> = Vec::new();
    if let Some(system) = render_system(request.system_instruction.as_ref()) {
        system_parts.push(system);
    }

    let mut messages: Vec<Value> = Vec::new();
    for message in &request.messages {
        if message.has_function_response() && !tools_enabled {
            continue;
        }
        // System turns inside the history fold into the system parameter.
        if message.role == Role::System {
            let text = message.text();
            if !text.is_empty() {
                system_parts.push(text);
            }
            continue;
        }

        let role = if message.role == Role::Model {
            "assistant"
        } else {
            "user"
        };
        let mut blocks: Vec<Value> = Vec::new();
        for part in &message.parts {
            match part {
                Part::Text { text } => {
                    if !text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text}));
                    }
                }
                Part::FunctionCall { name, args, id } => {
                    if tools_enabled {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": id.as_deref().unwrap_or(FALLBACK_CALL_ID),
                            "name": name,
                            "input": Value::Object(args.clone()),
                        }));
                    }
                }
                Part::FunctionResponse { id, response } => {
                    let content = serde_json::to_string(&Value::Object(response.clone()))
                        .unwrap_or_default();
                    blocks.push(json!({
                        "type": "tool_result",
                        "tool_use_id": id.as_deref().unwrap_or(FALLBACK_CALL_ID),
                        "content": content,
                    }));
                }
            }
        }
        if blocks.is_empty() {
            continue;
        }
        messages.push(json!({"role": role, "content": blocks}));
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "stream": stream,
    });
    if !system_parts.is_empty() {
        body["system"] = Value::String(system_parts.join("\n\n"));
    }
    if let Some(temperature) = request.options.temperature {
        body["temperature"] = json!(temperature);
    }
    if tools_enabled && request.declares_tools() {
        if let Some(tools) = &request.tools {
            body["tools"] = Value::Array(tools.iter().map(tool_to_value).collect());
        }
    }

    body
}

fn tool_to_value(decl: &ToolDeclaration) -> Value {
    json!({
        "name": decl.name,
        "description": decl.description.clone().unwrap_or_default(),
        "input_schema": decl.parameters.clone().unwrap_or_else(default_tool_schema),
    })
}

/// Parse a non-streaming `/v1/messages` response.
pub fn parse_messages_response(body: &Value) -> GenerateResponse {
    let mut parts: Vec<Part> = Vec::new();
    if let Some(blocks) = body.get("content").and_then(|v| v.as_array()) {
        for block in blocks {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|v| v.as_str()) {
                        if !text.is_empty() {
                            parts.push(Part::text(text));
                        }
                    }
                }
                Some("tool_use") => {
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default();
                    let args = block
                        .get("input")
                        .and_then(|v| v.as_object())
                        .cloned()
                        .unwrap_or_default();
                    let id = block.get("id").and_then(|v| v.as_str());
                    parts.push(match id {
                        Some(id) => Part::function_call_with_id(name, args, id),
                        None => Part::function_call(name, args),
                    });
                }
                _ => {}
            }
        }
    }

    let finish_reason = body
        .get("stop_reason")
        .and_then(|v| v.as_str())
        .map(normalize_stop_reason);
    let usage = UsageMetadata::totaled(
        body.pointer("/usage/input_tokens").and_then(Value::as_u64).unwrap_or(0),
        body.pointer("/usage/output_tokens").and_then(Value::as_u64).unwrap_or(0),
    );

    GenerateResponse::from_parts(parts, finish_reason, usage)
}

pub(crate) fn normalize_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::MaxTokens,
        "tool_use" => FinishReason::ToolCall,
        other => FinishReason::Other(other.to_string()),
    }
}

/// One decoded server-sent event of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagesEvent {
    /// `message_start`; carries the prompt token count.
    MessageStart { input_tokens: u64 },
    /// `content_block_delta` with a `text_delta`.
    TextDelta { text: String },
    /// `content_block_start` opening a `tool_use` block.
    ToolUseStart { id: Option<String>, name: String },
    /// `content_block_delta` with an `input_json_delta` fragment.
    InputJsonDelta { partial: String },
    /// `content_block_stop`.
    BlockStop,
    /// `message_delta`; carries the running output token count and, at the
    /// end, the stop reason.
    MessageDelta {
        output_tokens: Option<u64>,
        stop_reason: Option<FinishReason>,
    },
    /// `message_stop`.
    MessageStop,
    /// In-stream `error` event.
    Error { message: String },
}

/// Map one SSE data object to a [`MessagesEvent`].
///
/// Returns `None` for events with nothing to act on (pings, text block
/// starts, unknown types).
pub fn parse_stream_event(value: &Value) -> Option<MessagesEvent> {
    match value.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "message_start" => Some(MessagesEvent::MessageStart {
            input_tokens: value
                .pointer("/message/usage/input_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        }),
        "content_block_start" => {
            let block = value.get("content_block")?;
            if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                Some(MessagesEvent::ToolUseStart {
                    id: block.get("id").and_then(|v| v.as_str()).map(String::from),
                    name: block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
            } else {
                None
            }
        }
        "content_block_delta" => {
            if let Some(text) = value.pointer("/delta/text").and_then(|v| v.as_str()) {
                return Some(MessagesEvent::TextDelta {
                    text: text.to_string(),
                });
            }
            if let Some(partial) = value.pointer("/delta/partial_json").and_then(|v| v.as_str()) {
                return Some(MessagesEvent::InputJsonDelta {
                    partial: partial.to_string(),
                });
            }
            None
        }
        "content_block_stop" => Some(MessagesEvent::BlockStop),
        "message_delta" => Some(MessagesEvent::MessageDelta {
            output_tokens: value
                .pointer("/usage/output_tokens")
                .and_then(Value::as_u64),
            stop_reason: value
                .pointer("/delta/stop_reason")
                .and_then(|v| v.as_str())
                .map(normalize_stop_reason),
        }),
        "message_stop" => Some(MessagesEvent::MessageStop),
        "error" => Some(MessagesEvent::Error {
            message: value
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("stream error")
                .to_string(),
        }),
        _ => None,
    }
}
