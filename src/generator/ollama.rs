//! Ollama content generator.

use std::env;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::drivers::ollama::{self, NAME};
use crate::stream;
use crate::tokens;
use crate::transport::ollama::{OllamaApi, OllamaHttp};
use crate::types::{GenerateRequest, GenerateResponse};
use crate::{Error, ResponseStream, Result};

use super::tool_support::{self, ToolSupport};
use super::{embedding_input, ContentGenerator};

/// Default local server address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Environment variable overriding the default base URL.
pub const BASE_URL_ENV: &str = "OLLAMA_HOST";

/// Connection settings for a local or remote Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// How long the server keeps the model loaded after a request,
    /// e.g. `"5m"`. `None` leaves the server default in place.
    pub keep_alive: Option<String>,
}

impl OllamaConfig {
    /// Config for `model`, reading the base URL from `OLLAMA_HOST` when set.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            model: model.into(),
            keep_alive: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn keep_alive(mut self, keep_alive: impl Into<String>) -> Self {
        self.keep_alive = Some(keep_alive.into());
        self
    }
}

fn default_base_url() -> String {
    env::var(BASE_URL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

/// [`ContentGenerator`] backed by an Ollama server.
pub struct OllamaGenerator {
    api: Arc<dyn OllamaApi>,
    model: String,
    keep_alive: Option<String>,
    tool_support: ToolSupport,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let api: Arc<dyn OllamaApi> = Arc::new(OllamaHttp::new(&config.base_url)?);
        Ok(Self::with_api(api, config))
    }

    /// Build on top of an existing transport, e.g. a scripted fake in tests.
    pub fn with_api(api: Arc<dyn OllamaApi>, config: OllamaConfig) -> Self {
        Self {
            api,
            model: config.model,
            keep_alive: config.keep_alive,
            tool_support: ToolSupport::new(),
        }
    }

    pub fn tool_support(&self) -> &ToolSupport {
        &self.tool_support
    }

    /// Chat payload reflecting the probe's belief at this instant.
    fn payload(&self, request: &GenerateRequest, streaming: bool) -> Value {
        let mut body = ollama::build_chat_payload(
            request,
            &self.model,
            self.tool_support.is_enabled(),
            streaming,
        );
        if let Some(keep_alive) = &self.keep_alive {
            body["keep_alive"] = json!(keep_alive);
        }
        body
    }

    async fn open_stream(&self, request: &GenerateRequest) -> Result<ResponseStream> {
        let chunks = self.api.chat_stream(self.payload(request, true)).await?;
        Ok(stream::ollama::aggregate(chunks))
    }

    fn should_retry_without_tools(&self, error: &Error) -> bool {
        matches!(error, Error::ToolsUnsupported { .. }) && self.tool_support.is_enabled()
    }

    fn disable_tools(&self, error: &Error) {
        tracing::warn!(
            model = %self.model,
            %error,
            "backend rejected tool declarations; disabling tools and retrying once"
        );
        self.tool_support.disable();
    }
}

#[async_trait]
impl ContentGenerator for OllamaGenerator {
    fn backend_name(&self) -> &str {
        NAME
    }

    async fn generate_content(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        match self.api.chat(self.payload(request, false)).await {
            Ok(body) => Ok(ollama::parse_chat_response(&body)),
            Err(error) => {
                let error = tool_support::classify(error);
                if !self.should_retry_without_tools(&error) {
                    return Err(error);
                }
                self.disable_tools(&error);
                let body = self.api.chat(self.payload(request, false)).await?;
                Ok(ollama::parse_chat_response(&body))
            }
        }
    }

    async fn generate_content_stream(&self, request: &GenerateRequest) -> Result<ResponseStream> {
        let mut chunks = match self.open_stream(request).await {
            Ok(chunks) => chunks,
            Err(error) => {
                let error = tool_support::classify(error);
                if !self.should_retry_without_tools(&error) {
                    return Err(error);
                }
                self.disable_tools(&error);
                return self.open_stream(request).await;
            }
        };

        // A tool refusal can also surface as the first stream item. Commit to
        // the stream only once a real chunk arrives; afterwards errors pass
        // through to the caller untouched.
        match chunks.next().await {
            None => Ok(Box::pin(futures::stream::empty())),
            Some(Ok(first)) => Ok(Box::pin(
                futures::stream::once(async move { Ok(first) }).chain(chunks),
            )),
            Some(Err(error)) => {
                let error = tool_support::classify(error);
                if !self.should_retry_without_tools(&error) {
                    return Err(error);
                }
                self.disable_tools(&error);
                self.open_stream(request).await
            }
        }
    }

    async fn count_tokens(&self, request: &GenerateRequest) -> Result<u64> {
        Ok(tokens::estimate_request_tokens(request))
    }

    async fn embed_content(&self, request: &GenerateRequest) -> Result<Vec<f32>> {
        let input = embedding_input(request);
        if input.trim().is_empty() {
            return Err(Error::embedding_unsupported(
                NAME,
                "request contains no text to embed",
            ));
        }
        let body = self
            .api
            .embed(ollama::build_embed_payload(&self.model, &input))
            .await?;
        ollama::parse_embed_response(&body)
            .ok_or_else(|| Error::provider(NAME, "embedding response contained no vector"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;

    struct NeverApi;

    #[async_trait]
    impl OllamaApi for NeverApi {
        async fn chat(&self, _payload: Value) -> Result<Value> {
            unreachable!("not exercised")
        }

        async fn chat_stream(&self, _payload: Value) -> Result<crate::BoxStream<'static, Value>> {
            unreachable!("not exercised")
        }

        async fn embed(&self, _payload: Value) -> Result<Value> {
            unreachable!("not exercised")
        }
    }

    fn generator(config: OllamaConfig) -> OllamaGenerator {
        OllamaGenerator::with_api(Arc::new(NeverApi), config)
    }

    #[test]
    fn test_payload_carries_keep_alive() {
        let generator = generator(OllamaConfig::new("llama3.2").keep_alive("5m"));
        let request = GenerateRequest::from_text("hi");
        let body = generator.payload(&request, false);
        assert_eq!(body["keep_alive"], "5m");
        assert_eq!(body["model"], "llama3.2");
    }

    #[test]
    fn test_payload_tracks_probe_state() {
        let generator = generator(OllamaConfig::new("llama3.2"));
        let request = GenerateRequest::from_text("hi")
            .tools(vec![crate::types::ToolDeclaration::new("get_weather")]);

        assert!(generator.payload(&request, false).get("tools").is_some());
        generator.tool_support().disable();
        assert!(generator.payload(&request, false).get("tools").is_none());
    }

    #[tokio::test]
    async fn test_count_tokens_is_local() {
        // NeverApi panics on any network call, so a passing estimate proves
        // counting never touches the transport.
        let generator = generator(OllamaConfig::new("llama3.2"));
        let request = GenerateRequest::new(vec![Message::user("12345678")]);
        assert_eq!(generator.count_tokens(&request).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_input() {
        let generator = generator(OllamaConfig::new("nomic-embed-text"));
        let request = GenerateRequest::new(vec![]);
        let error = generator.embed_content(&request).await.unwrap_err();
        assert!(matches!(error, Error::EmbeddingUnsupported { .. }));
    }
}
