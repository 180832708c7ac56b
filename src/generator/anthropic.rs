//! Anthropic Messages API content generator.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;

use crate::auth::{self, CredentialKey, CredentialStore};
use crate::drivers::anthropic::{self, NAME};
use crate::stream;
use crate::tokens;
use crate::transport::anthropic::{AnthropicApi, AnthropicHttp};
use crate::types::{GenerateRequest, GenerateResponse};
use crate::{Error, ResponseStream, Result};

use super::tool_support::{self, ToolSupport};
use super::ContentGenerator;

/// Hosted API address.
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Connection settings for the Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl AnthropicConfig {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Config for `model` with the key resolved from `ANTHROPIC_API_KEY`
    /// first and the credential store second.
    pub fn resolve(model: impl Into<String>, store: &dyn CredentialStore) -> Result<Self> {
        let api_key = auth::resolve_api_key(API_KEY_ENV, CredentialKey::Anthropic, store)
            .ok_or_else(|| {
                Error::configuration(
                    "missing Anthropic API key: set ANTHROPIC_API_KEY or store a credential",
                )
            })?;
        Ok(Self::new(model, api_key))
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// [`ContentGenerator`] backed by the Anthropic Messages API.
pub struct AnthropicGenerator {
    api: Arc<dyn AnthropicApi>,
    model: String,
    tool_support: ToolSupport,
}

impl AnthropicGenerator {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let api: Arc<dyn AnthropicApi> =
            Arc::new(AnthropicHttp::new(&config.base_url, config.api_key)?);
        Ok(Self::with_api(api, config.model))
    }

    /// Build on top of an existing transport, e.g. a scripted fake in tests.
    pub fn with_api(api: Arc<dyn AnthropicApi>, model: impl Into<String>) -> Self {
        Self {
            api,
            model: model.into(),
            tool_support: ToolSupport::new(),
        }
    }

    pub fn tool_support(&self) -> &ToolSupport {
        &self.tool_support
    }

    fn payload(&self, request: &GenerateRequest, streaming: bool) -> Value {
        anthropic::build_messages_payload(
            request,
            &self.model,
            self.tool_support.is_enabled(),
            streaming,
        )
    }

    async fn open_stream(&self, request: &GenerateRequest) -> Result<ResponseStream> {
        let events = self.api.messages_stream(self.payload(request, true)).await?;
        Ok(stream::anthropic::aggregate(events))
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
impl ContentGenerator for AnthropicGenerator {
    fn backend_name(&self) -> &str {
        NAME
    }

    async fn generate_content(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        match self.api.messages(self.payload(request, false)).await {
            Ok(body) => Ok(anthropic::parse_messages_response(&body)),
            Err(error) => {
                let error = tool_support::classify(error);
                if !self.should_retry_without_tools(&error) {
                    return Err(error);
                }
                self.disable_tools(&error);
                let body = self.api.messages(self.payload(request, false)).await?;
                Ok(anthropic::parse_messages_response(&body))
            }
        }
    }

    async fn generate_content_stream(&self, request: &GenerateRequest) -> Result<ResponseStream> {
        let mut events = match self.open_stream(request).await {
            Ok(events) => events,
            Err(error) => {
                let error = tool_support::classify(error);
                if !self.should_retry_without_tools(&error) {
                    return Err(error);
                }
                self.disable_tools(&error);
                return self.open_stream(request).await;
            }
        };

        // Commit to the stream only once a real chunk arrives; a refusal that
        // surfaces as the first item still qualifies for the tool-free retry.
        match events.next().await {
            None => Ok(Box::pin(futures::stream::empty())),
            Some(Ok(first)) => Ok(Box::pin(
                futures::stream::once(async move { Ok(first) }).chain(events),
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

    async fn embed_content(&self, _request: &GenerateRequest) -> Result<Vec<f32>> {
        Err(Error::embedding_unsupported(
            NAME,
            "the Messages API exposes no embedding endpoint",
        ))
    }
}
