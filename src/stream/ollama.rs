//! Aggregation for NDJSON chat streams.
//!
//! Text arrives as bare incremental fragments, and models that were prompted
//! with tool declarations sometimes serialize the call into that text
//! instead of using the structured channel. The accumulator below withholds
//! anything that could be the head of such a serialized call and settles the
//! question at end of stream: parse it into a function call, or flush it
//! back out as ordinary text.

use futures::{stream, StreamExt};
use serde_json::{Map, Value};

use crate::drivers::ollama;
use crate::types::{FinishReason, GenerateResponse, Part};
use crate::{BoxStream, Error, ResponseStream};

use super::UsageTracker;

/// Buffered text with a sticky tool-call suspicion flag.
#[derive(Debug, Default)]
struct TextAccumulator {
    buffer: String,
    flagged: bool,
}

impl TextAccumulator {
    /// Absorb one fragment; returns text that is safe to emit now.
    ///
    /// A buffer whose trimmed form opens with `{` is withheld, and once it
    /// also contains `"name"` it is committed as potentially a tool call
    /// until end of stream. Anything else flushes immediately.
    fn push(&mut self, fragment: &str) -> Option<String> {
        self.buffer.push_str(fragment);
        let opens_object = self.buffer.trim_start().starts_with('{');
        if !self.flagged && opens_object && self.buffer.contains("\"name\"") {
            self.flagged = true;
        }
        if opens_object {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Settle whatever is still buffered at end of stream.
    fn finish(&mut self) -> Option<Part> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        if self.flagged {
            match recover_tool_call(&raw) {
                Ok(part) => return Some(part),
                Err(err) => {
                    tracing::debug!(error = %err, "withheld text did not form a tool call; emitting as text");
                }
            }
        }
        Some(Part::text(raw))
    }
}

#[derive(Debug, thiserror::Error)]
enum ToolJsonError {
    #[error("{0}")]
    Parse(#[from] serde_json::Error),
    #[error("missing name or arguments field")]
    Shape,
}

fn recover_tool_call(raw: &str) -> Result<Part, ToolJsonError> {
    let value: Value = serde_json::from_str(raw.trim())?;
    let name = value
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or(ToolJsonError::Shape)?;
    let args: Map<String, Value> = match value.get("arguments") {
        Some(Value::Object(map)) => map.clone(),
        _ => return Err(ToolJsonError::Shape),
    };
    Ok(Part::function_call(name, args))
}

struct AggState {
    chunks: BoxStream<'static, Value>,
    text: TextAccumulator,
    usage: UsageTracker,
    saw_chunk: bool,
    finished: bool,
}

/// Aggregate a decoded NDJSON chunk stream into unified response chunks.
///
/// The result is pull-driven: nothing is read from `chunks` until the
/// consumer polls. Exactly one terminal chunk (finish reason set) ends the
/// sequence; an in-stream error ends it instead. A backend stream that
/// closes without delivering a single chunk aggregates to nothing.
pub fn aggregate(chunks: BoxStream<'static, Value>) -> ResponseStream {
    let state = AggState {
        chunks,
        text: TextAccumulator::default(),
        usage: UsageTracker::default(),
        saw_chunk: false,
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.chunks.next().await {
                Some(Ok(value)) => {
                    state.saw_chunk = true;
                    let chunk = ollama::parse_stream_chunk(&value);
                    if let Some(message) = chunk.error {
                        state.finished = true;
                        return Some((Err(Error::provider(ollama::NAME, message)), state));
                    }
                    if let Some(count) = chunk.prompt_tokens {
                        state.usage.record_prompt(count);
                    }
                    if let Some(count) = chunk.output_tokens {
                        state.usage.record_output(count);
                    }

                    let mut parts: Vec<Part> = Vec::new();
                    if !chunk.text.is_empty() {
                        if let Some(ready) = state.text.push(&chunk.text) {
                            parts.push(Part::text(ready));
                        }
                    }
                    parts.extend(chunk.calls);

                    if chunk.done {
                        state.finished = true;
                        if let Some(part) = state.text.finish() {
                            parts.push(part);
                        }
                        let finish = chunk.done_reason.unwrap_or(FinishReason::Stop);
                        let usage = state.usage.snapshot();
                        return Some((
                            Ok(GenerateResponse::from_parts(parts, Some(finish), usage)),
                            state,
                        ));
                    }
                    if parts.is_empty() {
                        // Everything was withheld; keep pulling.
                        continue;
                    }
                    let usage = state.usage.snapshot();
                    return Some((
                        Ok(GenerateResponse::from_parts(parts, None, usage)),
                        state,
                    ));
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => {
                    state.finished = true;
                    if !state.saw_chunk {
                        return None;
                    }
                    // Connection closed without a done marker; settle and
                    // still emit the terminal chunk.
                    let parts: Vec<Part> = state.text.finish().into_iter().collect();
                    let usage = state.usage.snapshot();
                    return Some((
                        Ok(GenerateResponse::from_parts(
                            parts,
                            Some(FinishReason::Stop),
                            usage,
                        )),
                        state,
                    ));
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn value_stream(values: Vec<Value>) -> BoxStream<'static, Value> {
        Box::pin(tokio_stream::iter(values.into_iter().map(Ok)))
    }

    fn text_chunk(text: &str) -> Value {
        json!({"message": {"role": "assistant", "content": text}, "done": false})
    }

    fn done_chunk() -> Value {
        json!({
            "message": {"role": "assistant", "content": ""},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 26,
            "eval_count": 8
        })
    }

    async fn collect(stream: ResponseStream) -> Vec<crate::Result<GenerateResponse>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_plain_text_streams_through() {
        let chunks = value_stream(vec![
            text_chunk("Hello "),
            text_chunk("world"),
            done_chunk(),
        ]);
        let collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 3);
        let first = collected[0].as_ref().unwrap();
        assert_eq!(first.text(), "Hello ");
        assert!(first.finish_reason().is_none());
        assert_eq!(collected[1].as_ref().unwrap().text(), "world");

        let terminal = collected[2].as_ref().unwrap();
        assert_eq!(terminal.finish_reason(), Some(&FinishReason::Stop));
        assert_eq!(terminal.usage.prompt_tokens, 26);
        assert_eq!(terminal.usage.total_tokens, 34);
    }

    #[tokio::test]
    async fn test_serialized_tool_call_is_recovered() {
        let chunks = value_stream(vec![
            text_chunk("{"),
            text_chunk("\"name\":\"foo\","),
            text_chunk("\"arguments\":{}}"),
            done_chunk(),
        ]);
        let collected = collect(aggregate(chunks)).await;

        // Nothing may leak before the terminal chunk.
        assert_eq!(collected.len(), 1);
        let terminal = collected[0].as_ref().unwrap();
        assert_eq!(terminal.text(), "");
        let calls = terminal.function_calls();
        assert_eq!(calls.len(), 1);
        match calls[0] {
            Part::FunctionCall { name, args, .. } => {
                assert_eq!(name, "foo");
                assert!(args.is_empty());
            }
            other => panic!("expected function call, got {other:?}"),
        }
        assert_eq!(terminal.finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn test_unparseable_suspect_degrades_to_text() {
        let chunks = value_stream(vec![
            text_chunk("{\"name\": \"foo\", \"arguments\":"),
            done_chunk(),
        ]);
        let collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 1);
        let terminal = collected[0].as_ref().unwrap();
        assert_eq!(terminal.text(), "{\"name\": \"foo\", \"arguments\":");
        assert!(terminal.function_calls().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_shape_degrades_to_text() {
        // Parses fine but lacks an arguments object.
        let chunks = value_stream(vec![text_chunk("{\"name\": \"foo\"}"), done_chunk()]);
        let collected = collect(aggregate(chunks)).await;

        let terminal = collected[0].as_ref().unwrap();
        assert_eq!(terminal.text(), "{\"name\": \"foo\"}");
        assert!(terminal.function_calls().is_empty());
    }

    #[tokio::test]
    async fn test_brace_without_name_flushes_at_end() {
        let chunks = value_stream(vec![text_chunk("{not json"), done_chunk()]);
        let collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].as_ref().unwrap().text(), "{not json");
    }

    #[tokio::test]
    async fn test_structured_tool_calls_pass_through_immediately() {
        let call_chunk = json!({
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "get_weather", "arguments": {"city": "Tokyo"}}}
                ]
            },
            "done": false
        });
        let chunks = value_stream(vec![call_chunk, done_chunk()]);
        let collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 2);
        let first = collected[0].as_ref().unwrap();
        assert_eq!(first.function_calls().len(), 1);
        assert!(first.finish_reason().is_none());
    }

    #[tokio::test]
    async fn test_stream_error_object_ends_sequence() {
        let chunks = value_stream(vec![
            text_chunk("partial"),
            json!({"error": "model busy"}),
            text_chunk("never seen"),
        ]);
        let mut collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 2);
        let err = collected.pop().unwrap().unwrap_err();
        match err {
            Error::Provider { backend, message } => {
                assert_eq!(backend, "ollama");
                assert_eq!(message, "model busy");
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_input_aggregates_to_nothing() {
        let collected = collect(aggregate(value_stream(vec![]))).await;
        assert!(collected.is_empty());
    }

    #[tokio::test]
    async fn test_eos_without_done_still_emits_terminal() {
        let chunks = value_stream(vec![text_chunk("cut off")]);
        let collected = collect(aggregate(chunks)).await;

        assert_eq!(collected.len(), 2);
        let terminal = collected[1].as_ref().unwrap();
        assert_eq!(terminal.finish_reason(), Some(&FinishReason::Stop));
        assert!(terminal.candidates[0].content.parts.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_count_first_report_wins() {
        let early = json!({
            "message": {"content": "a"},
            "done": false,
            "prompt_eval_count": 10,
            "eval_count": 1
        });
        let late = json!({
            "message": {"content": ""},
            "done": true,
            "done_reason": "stop",
            "prompt_eval_count": 99,
            "eval_count": 7
        });
        let collected = collect(aggregate(value_stream(vec![early, late]))).await;

        let terminal = collected.last().unwrap().as_ref().unwrap();
        assert_eq!(terminal.usage.prompt_tokens, 10);
        assert_eq!(terminal.usage.candidate_tokens, 7);
        assert_eq!(terminal.usage.total_tokens, 17);
    }
}
