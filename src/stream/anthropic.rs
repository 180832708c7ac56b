//! Aggregation for SSE message streams.
//!
//! Content arrives in indexed blocks. Text deltas forward as they come; a
//! `tool_use` block opens a pending call whose argument JSON accumulates
//! across `input_json_delta` fragments and surfaces as one complete
//! function-call chunk when the block closes. The final `message_delta`
//! carries the stop reason, and `message_stop` triggers the terminal chunk.

use futures::{stream, StreamExt};
use serde_json::{Map, Value};

use crate::drivers::anthropic::{self, MessagesEvent};
use crate::types::{FinishReason, GenerateResponse, Part};
use crate::{BoxStream, Error, ResponseStream};

use super::UsageTracker;

/// A `tool_use` block whose arguments are still streaming.
#[derive(Debug)]
struct PendingToolUse {
    id: Option<String>,
    name: String,
    args_json: String,
}

impl PendingToolUse {
    fn into_part(self) -> Part {
        let args = parse_args(&self.args_json);
        match self.id {
            Some(id) => Part::function_call_with_id(self.name, args, id),
            None => Part::function_call(self.name, args),
        }
    }
}

fn parse_args(raw: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        _ => {
            tracing::debug!("tool input fragments did not form a JSON object; using empty arguments");
            Map::new()
        }
    }
}

struct AggState {
    events: BoxStream<'static, Value>,
    usage: UsageTracker,
    pending: Option<PendingToolUse>,
    stop_reason: Option<FinishReason>,
    saw_event: bool,
    finished: bool,
}

/// Aggregate a decoded SSE event stream into unified response chunks.
///
/// Pull-driven like its NDJSON counterpart: each consumer poll advances the
/// wire stream only far enough to produce the next unified chunk. An event
/// stream that closes without delivering anything aggregates to nothing.
pub fn aggregate(events: BoxStream<'static, Value>) -> ResponseStream {
    let state = AggState {
        events,
        usage: UsageTracker::default(),
        pending: None,
        stop_reason: None,
        saw_event: false,
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.events.next().await {
                Some(Ok(value)) => {
                    state.saw_event = true;
                    let event = match anthropic::parse_stream_event(&value) {
                        Some(event) => event,
                        None => continue,
                    };
                    match event {
                        MessagesEvent::MessageStart { input_tokens } => {
                            state.usage.record_prompt(input_tokens);
                        }
                        MessagesEvent::TextDelta { text } => {
                            if text.is_empty() {
                                continue;
                            }
                            let usage = state.usage.snapshot();
                            return Some((
                                Ok(GenerateResponse::from_parts(
                                    vec![Part::text(text)],
                                    None,
                                    usage,
                                )),
                                state,
                            ));
                        }
                        MessagesEvent::ToolUseStart { id, name } => {
                            state.pending = Some(PendingToolUse {
                                id,
                                name,
                                args_json: String::new(),
                            });
                        }
                        MessagesEvent::InputJsonDelta { partial } => {
                            if let Some(pending) = state.pending.as_mut() {
                                pending.args_json.push_str(&partial);
                            }
                        }
                        MessagesEvent::BlockStop => {
                            if let Some(pending) = state.pending.take() {
                                let usage = state.usage.snapshot();
                                return Some((
                                    Ok(GenerateResponse::from_parts(
                                        vec![pending.into_part()],
                                        None,
                                        usage,
                                    )),
                                    state,
                                ));
                            }
                        }
                        MessagesEvent::MessageDelta {
                            output_tokens,
                            stop_reason,
                        } => {
                            if let Some(count) = output_tokens {
                                state.usage.record_output(count);
                            }
                            if stop_reason.is_some() {
                                state.stop_reason = stop_reason;
                            }
                        }
                        MessagesEvent::MessageStop => {
                            state.finished = true;
                            let finish =
                                state.stop_reason.take().unwrap_or(FinishReason::Stop);
                            let usage = state.usage.snapshot();
                            return Some((
                                Ok(GenerateResponse::from_parts(vec![], Some(finish), usage)),
                                state,
                            ));
                        }
                        MessagesEvent::Error { message } => {
                            state.finished = true;
                            return Some((
                                Err(Error::provider(anthropic::NAME, message)),
                                state,
                            ));
                        }
                    }
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    if !state.saw_event {
                        return None;
                    }
                    // Connection closed before message_stop.
                    let finish = state.stop_reason.take().unwrap_or(FinishReason::Stop);
                    let usage = state.usage.snapshot();
                    return Some((
                        Ok(GenerateResponse::from_parts(vec![], Some(finish), usage)),
                        state,
                    ));
                }
            }
        }
    }))
}
