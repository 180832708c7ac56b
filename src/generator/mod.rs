//! 内容生成适配器模块：统一请求模型与各后端 API 之间的桥接层。
//!
//! Content generator adapters: the bridge between the unified request model
//! and each backend's native API.
//!
//! Every backend implements [`ContentGenerator`], which exposes the four
//! operations callers see:
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | `generate_content` | One request, one aggregated response |
//! | `generate_content_stream` | One request, an incremental stream of partial responses |
//! | `count_tokens` | Local estimate, no network traffic |
//! | `embed_content` | Embedding vector, or `EmbeddingUnsupported` |
//!
//! Adapters own a [`ToolSupport`] probe. A request that the backend rejects
//! because of its tool declarations flips the probe and is retried exactly
//! once without tools; the fallback happens inside the adapter so callers
//! never see the first failure.
//!
//! # Example
//!
//! ```no_run
//! use unigen::generator::{ContentGenerator, OllamaConfig, OllamaGenerator};
//! use unigen::types::GenerateRequest;
//!
//! # async fn run() -> unigen::Result<()> {
//! let generator = OllamaGenerator::new(OllamaConfig::new("llama3.2"))?;
//! let request = GenerateRequest::from_text("Why is the sky blue?");
//! let response = generator.generate_content(&request).await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

mod anthropic;
mod ollama;
pub mod tool_support;

pub use anthropic::{AnthropicConfig, AnthropicGenerator};
pub use ollama::{OllamaConfig, OllamaGenerator};
pub use tool_support::{ToolSupport, ToolSupportState};

use async_trait::async_trait;

use crate::types::{GenerateRequest, GenerateResponse, Part};
use crate::{ResponseStream, Result};

/// Backend-agnostic content generation interface.
///
/// Implementations are cheap to share behind an `Arc` and safe to call
/// concurrently; per-adapter state is limited to the tool-support probe.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Stable backend identifier, used in error and log context.
    fn backend_name(&self) -> &str;

    /// Send a request and wait for the complete response.
    async fn generate_content(&self, request: &GenerateRequest) -> Result<GenerateResponse>;

    /// Send a request and surface partial responses as the backend emits
    /// them. Chunks are yielded as the caller polls, but the first chunk may
    /// be fetched before the stream is returned: a tools-unsupported failure
    /// has to settle the tool-free retry up front, never mid-stream.
    async fn generate_content_stream(&self, request: &GenerateRequest) -> Result<ResponseStream>;

    /// Estimate the prompt size in tokens without calling the backend.
    async fn count_tokens(&self, request: &GenerateRequest) -> Result<u64>;

    /// Embed the request's text content into a vector.
    async fn embed_content(&self, request: &GenerateRequest) -> Result<Vec<f32>>;
}

/// Text an embedding call should operate on: every text part across the
/// request's messages, in order.
pub(crate) fn embedding_input(request: &GenerateRequest) -> String {
    request
        .messages
        .iter()
        .flat_map(|message| message.parts.iter())
        .filter_map(Part::as_text)
        .collect::<Vec<_>>()
        .join("\n")
}
