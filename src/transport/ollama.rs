//! HTTP client for the Ollama server API.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::drivers::ollama::NAME;
use crate::{BoxStream, Error, Result};

use super::{build_client, byte_stream, decode_ndjson, validate_base_url, REQUEST_ID_HEADER};

/// The server surface the generator needs, as a trait so tests can fake it.
#[async_trait]
pub trait OllamaApi: Send + Sync {
    /// POST `/api/chat` with `stream: false`; returns the response body.
    async fn chat(&self, payload: Value) -> Result<Value>;
    /// POST `/api/chat` with `stream: true`; returns decoded NDJSON chunks.
    async fn chat_stream(&self, payload: Value) -> Result<BoxStream<'static, Value>>;
    /// POST `/api/embed`; returns the response body.
    async fn embed(&self, payload: Value) -> Result<Value>;
}

/// Real HTTP implementation of [`OllamaApi`].
#[derive(Debug, Clone)]
pub struct OllamaHttp {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaHttp {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: validate_base_url(base_url)?,
        })
    }

    async fn post(&self, path: &str, payload: &Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
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

/// The server reports errors as `{"error": "..."}`; fall back to the raw
/// body, then to the status line.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
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
impl OllamaApi for OllamaHttp {
    async fn chat(&self, payload: Value) -> Result<Value> {
        let response = self.post("/api/chat", &payload).await?;
        response
            .json()
            .await
            .map_err(|e| Error::provider(NAME, e.to_string()))
    }

    async fn chat_stream(&self, payload: Value) -> Result<BoxStream<'static, Value>> {
        let response = self.post("/api/chat", &payload).await?;
        Ok(decode_ndjson(byte_stream(response, NAME)))
    }

    async fn embed(&self, payload: Value) -> Result<Value> {
        let response = self.post("/api/embed", &payload).await?;
        response
            .json()
            .await
            .map_err(|e| Error::provider(NAME, e.to_string()))
    }
}
