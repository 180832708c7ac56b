//! HTTP 传输层 — 后端 API 客户端与流式解码
//!
//! # Transport Module
//!
//! One thin HTTP client per backend, each behind a trait so generators can
//! be driven by fakes in tests. The traits speak `serde_json::Value` at both
//! ends: drivers build the payloads, aggregators interpret the decoded
//! stream, and nothing in between inspects the content.
//!
//! Shared here:
//! - Client construction with env-overridable timeouts and pooling
//! - Frame decoders (NDJSON lines, SSE events) from byte streams to values
//! - The outgoing correlation-id header
//!
//! | Module | Backend surface |
//! |--------|-----------------|
//! | [`ollama`] | `/api/chat`, `/api/embed`; NDJSON streaming |
//! | [`anthropic`] | `/v1/messages`; SSE streaming |

pub mod anthropic;
pub mod ollama;

use std::env;
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Proxy;
use serde_json::Value;

use crate::{BoxStream, Error, Result};

/// Correlation id attached to every outgoing request. Backends may ignore
/// it; applications can use it for log linkage.
pub const REQUEST_ID_HEADER: &str = "x-unigen-request-id";

/// Build the shared reqwest client with env-overridable defaults.
pub(crate) fn build_client() -> Result<reqwest::Client> {
    let timeout_secs = env::var("UNIGEN_HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(120);

    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(
            env::var("UNIGEN_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(32),
        )
        .pool_idle_timeout(Some(Duration::from_secs(
            env::var("UNIGEN_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(90),
        )));

    if let Ok(proxy_url) = env::var("UNIGEN_PROXY_URL") {
        if let Ok(proxy) = Proxy::all(&proxy_url) {
            builder = builder.proxy(proxy);
        }
    }

    builder
        .build()
        .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))
}

/// Validate a base URL and strip any trailing slash.
pub(crate) fn validate_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::configuration(format!("invalid base URL {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(Error::configuration(format!(
            "unsupported URL scheme {other:?} in base URL {raw:?}"
        ))),
    }
}

/// Map a response body to a value stream, wrapping transport errors with the
/// backend name.
pub(crate) fn byte_stream(
    response: reqwest::Response,
    backend: &'static str,
) -> BoxStream<'static, Bytes> {
    Box::pin(
        response
            .bytes_stream()
            .map_err(move |e| Error::provider(backend, e.to_string())),
    )
}

/// Append raw transport bytes to a text buffer, holding back a trailing
/// incomplete UTF-8 sequence until the rest of it arrives in a later chunk.
/// Invalid bytes inside a chunk become U+FFFD as with a lossy decode; bytes
/// still held when the wire closes belong to a code point that never
/// completed and are dropped.
fn append_utf8(buf: &mut String, carry: &mut Vec<u8>, bytes: &[u8]) {
    let mut pending = std::mem::take(carry);
    pending.extend_from_slice(bytes);
    let mut rest = pending.as_slice();
    loop {
        match std::str::from_utf8(rest) {
            Ok(text) => {
                buf.push_str(text);
                return;
            }
            Err(err) => {
                let valid = err.valid_up_to();
                buf.push_str(&String::from_utf8_lossy(&rest[..valid]));
                match err.error_len() {
                    // A code point split across transport chunks.
                    None => {
                        *carry = rest[valid..].to_vec();
                        return;
                    }
                    Some(bad) => {
                        buf.push('\u{FFFD}');
                        rest = &rest[valid + bad..];
                    }
                }
            }
        }
    }
}

/// Decode an NDJSON byte stream: one JSON value per non-empty line.
pub(crate) fn decode_ndjson(input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
    let stream = stream::unfold(
        (input, String::new(), Vec::new()),
        move |(mut input, mut buf, mut carry)| async move {
            loop {
                if let Some(idx) = buf.find('\n') {
                    let line = buf[..idx].trim().to_string();
                    buf = buf[idx + 1..].to_string();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Value>(&line) {
                        Ok(v) => return Some((Ok(v), (input, buf, carry))),
                        Err(e) => {
                            return Some((Err(Error::Serialization(e)), (input, buf, carry)))
                        }
                    }
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        append_utf8(&mut buf, &mut carry, &bytes);
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf, carry))),
                    None => {
                        let line = buf.trim();
                        if line.is_empty() {
                            return None;
                        }
                        match serde_json::from_str::<Value>(line) {
                            Ok(v) => return Some((Ok(v), (input, String::new(), carry))),
                            Err(_) => return None,
                        }
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

/// Decode an SSE byte stream: frames split on blank lines, `data:` lines
/// concatenated and parsed as JSON. Comments and non-data fields are
/// skipped, as are frames whose data is not JSON.
pub(crate) fn decode_sse(input: BoxStream<'static, Bytes>) -> BoxStream<'static, Value> {
    let stream = stream::unfold(
        (input, String::new(), Vec::new()),
        move |(mut input, mut buf, mut carry)| async move {
            loop {
                if let Some(idx) = buf.find("\n\n") {
                    let frame = buf[..idx].to_string();
                    buf = buf[idx + 2..].to_string();
                    if let Some(v) = parse_sse_frame(&frame) {
                        return Some((Ok(v), (input, buf, carry)));
                    }
                    continue;
                }

                match input.next().await {
                    Some(Ok(bytes)) => {
                        append_utf8(&mut buf, &mut carry, &bytes);
                        // CRLF wires must still split frames on blank lines.
                        if buf.contains('\r') {
                            buf = buf.replace("\r\n", "\n");
                        }
                        continue;
                    }
                    Some(Err(e)) => return Some((Err(e), (input, buf, carry))),
                    None => {
                        // EOF: try the remaining buffer as one last frame.
                        if let Some(v) = parse_sse_frame(&buf) {
                            return Some((Ok(v), (input, String::new(), carry)));
                        }
                        return None;
                    }
                }
            }
        },
    );
    Box::pin(stream)
}

fn parse_sse_frame(frame: &str) -> Option<Value> {
    let mut data = String::new();
    for line in frame.lines() {
        let line = line.trim_start_matches('\r');
        if line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.trim_start());
        }
    }
    if data.is_empty() {
        return None;
    }
    serde_json::from_str(&data).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bytes_stream(chunks: Vec<&'static str>) -> BoxStream<'static, Bytes> {
        raw_bytes_stream(chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    fn raw_bytes_stream(chunks: Vec<Vec<u8>>) -> BoxStream<'static, Bytes> {
        Box::pin(tokio_stream::iter(
            chunks.into_iter().map(|c| Ok(Bytes::from(c))),
        ))
    }

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url("http://localhost:11434/").unwrap(),
            "http://localhost:11434"
        );
        assert_eq!(
            validate_base_url("https://api.anthropic.com").unwrap(),
            "https://api.anthropic.com"
        );
        assert!(validate_base_url("not a url").is_err());
        assert!(validate_base_url("ftp://example.com").is_err());
    }

    #[tokio::test]
    async fn test_decode_ndjson_across_chunk_boundaries() {
        let input = bytes_stream(vec!["{\"a\":1}\n{\"b\"", ":2}\n", "{\"c\":3}"]);
        let values: Vec<_> = decode_ndjson(input).collect().await;

        assert_eq!(values.len(), 3);
        assert_eq!(*values[0].as_ref().unwrap(), json!({"a": 1}));
        assert_eq!(*values[1].as_ref().unwrap(), json!({"b": 2}));
        // Trailing line without a newline still decodes at EOF.
        assert_eq!(*values[2].as_ref().unwrap(), json!({"c": 3}));
    }

    #[test]
    fn test_append_utf8_carries_split_code_point() {
        let mut buf = String::new();
        let mut carry = Vec::new();
        let accented = "é".as_bytes();

        append_utf8(&mut buf, &mut carry, &accented[..1]);
        assert_eq!(buf, "");
        assert_eq!(carry, &accented[..1]);

        append_utf8(&mut buf, &mut carry, &accented[1..]);
        assert_eq!(buf, "é");
        assert!(carry.is_empty());
    }

    #[test]
    fn test_append_utf8_replaces_invalid_bytes() {
        let mut buf = String::new();
        let mut carry = Vec::new();
        append_utf8(&mut buf, &mut carry, b"a\xFFb");
        assert_eq!(buf, "a\u{FFFD}b");
        assert!(carry.is_empty());
    }

    #[tokio::test]
    async fn test_decode_ndjson_multibyte_split_across_chunks() {
        let line = "{\"message\":{\"content\":\"日本\"}}\n".as_bytes();
        // Cut one byte into the first multibyte code point.
        let split = line.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let input = raw_bytes_stream(vec![line[..split].to_vec(), line[split..].to_vec()]);
        let values: Vec<_> = decode_ndjson(input).collect().await;

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_ref().unwrap()["message"]["content"], "日本");
    }

    #[tokio::test]
    async fn test_decode_ndjson_bad_line_is_an_error() {
        let input = bytes_stream(vec!["{\"a\":1}\nnot json\n{\"b\":2}\n"]);
        let values: Vec<_> = decode_ndjson(input).collect().await;

        assert_eq!(values.len(), 3);
        assert!(values[0].is_ok());
        assert!(matches!(values[1], Err(Error::Serialization(_))));
        assert!(values[2].is_ok());
    }

    #[tokio::test]
    async fn test_decode_sse_event_frames() {
        let input = bytes_stream(vec![
            "event: message_start\ndata: {\"type\":\"message_start\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_blo",
            "ck_delta\"}\n\n: keepalive comment\n\n",
        ]);
        let values: Vec<_> = decode_sse(input).collect().await;

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_ref().unwrap()["type"], "message_start");
        assert_eq!(values[1].as_ref().unwrap()["type"], "content_block_delta");
    }

    #[tokio::test]
    async fn test_decode_sse_crlf_framing() {
        let input = bytes_stream(vec![
            "data: {\"type\":\"message_start\"}\r\n\r\ndata: {\"type\":\"message_stop\"}\r\n\r\n",
        ]);
        let values: Vec<_> = decode_sse(input).collect().await;

        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_ref().unwrap()["type"], "message_start");
        assert_eq!(values[1].as_ref().unwrap()["type"], "message_stop");
    }

    #[tokio::test]
    async fn test_decode_sse_multibyte_split_across_chunks() {
        let frame = "data: {\"delta\":{\"text\":\"héllo\"}}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let input = raw_bytes_stream(vec![frame[..split].to_vec(), frame[split..].to_vec()]);
        let values: Vec<_> = decode_sse(input).collect().await;

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_ref().unwrap()["delta"]["text"], "héllo");
    }

    #[tokio::test]
    async fn test_decode_sse_final_frame_without_delimiter() {
        let input = bytes_stream(vec!["data: {\"type\":\"message_stop\"}"]);
        let values: Vec<_> = decode_sse(input).collect().await;

        assert_eq!(values.len(), 1);
        assert_eq!(values[0].as_ref().unwrap()["type"], "message_stop");
    }
}
