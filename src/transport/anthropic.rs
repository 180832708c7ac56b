//! HTTP client for the Anthropic Messages API.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::drivers::anthropic::{API_VERSION, NAME};
use crate::{BoxStream, Error, Result};

use super::{build_client, byte_stream, decode_sse, validate_base_url, REQUEST_ID_HEADER};

/// The API surface the generator needs, as a trait so tests can fake it.
#[async_trait]
pub trait AnthropicApi: Send + Sync {
    /// POST `/v1/messages` with `stream: false`; returns the response body.
    async fn messages(&self, payload: Value) -> Result<Value>;
    /// POST `/v1/messages` with `stream: true`; returns decoded SSE events.
    async fn messages_stream(&self, payload: Value) -> Result<BoxStream<'static, Value>>;
}

/// Real HTTP implementation of [`AnthropicApi`].
#[derive(Debug, Clone)]
pub struct AnthropicHttp {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AnthropicHttp {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: validate_base_url(base_url)?,
            api_key: api_key.into(),
        })
    }

    fn request(&self, stream: bool) -> reqwest::RequestBuilder {
        let url = format!("{}/v1/messages", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if stream {
            builder = builder.header("accept", "text/event-stream");
        }
        builder
    }

    async fn send(&self, payload: &Value, stream: bool) -> Result<reqwest::Response> {
        let response = self
            .request(stream)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::provider(NAME, e.to_string()))?;
        require_success(response).await
    }
}

async fn require_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::provider(NAME, error_message(status, &body)))
}

/// Errors come back as `{"type": "error", "error": {"type", "message"}}`.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl AnthropicApi for AnthropicHttp {
    async fn messages(&self, payload: Value) -> Result<Value> {
        let response = self.send(&payload, false).await?;
        response
            .json()
            .await
            .map_err(|e| Error::provider(NAME, e.to_string()))
    }

    async fn messages_stream(&self, payload: Value) -> Result<BoxStream<'static, Value>> {
        let response = self.send(&payload, true).await?;
        Ok(decode_sse(byte_stream(response, NAME)))
    }
}
