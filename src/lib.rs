//! # unigen
//!
//! 统一内容生成适配层：以单一数据模型驱动多个异构 LLM 后端。
//!
//! A unified content-generation adapter layer - one request/response model
//! driving heterogeneous LLM backends.
//!
//! ## Overview
//!
//! This library puts a single, backend-independent data model in front of
//! provider APIs that disagree about everything: message shape, tool-call
//! encoding, streaming framing, and error reporting. Callers build one
//! [`GenerateRequest`]; each adapter translates it to its backend's wire
//! format, normalizes whatever comes back into [`GenerateResponse`], and
//! hides backend quirks like tool-call JSON emitted as plain prose.
//!
//! ## Core Philosophy
//!
//! - **Unified Model**: one request/response shape, whatever the backend
//! - **Probed Capabilities**: tool support is learned from live rejections,
//!   never configured up front
//! - **Streaming-First**: lazy aggregation over NDJSON and SSE wire streams
//! - **Fail-Soft Credentials**: store lookups degrade to "absent", they never
//!   abort a request
//!
//! ## Key Features
//!
//! - **Adapters**: [`ContentGenerator`] implementations for Ollama and the
//!   Anthropic Messages API
//! - **Tool Fallback**: a backend that rejects tool declarations gets exactly
//!   one tool-free retry, then stays tool-free for the adapter's lifetime
//! - **Stream Recovery**: tool calls hallucinated as raw JSON text are
//!   reassembled into structured calls instead of leaking to the caller
//! - **Local Estimates**: token counting without a network round trip
//! - **Credential Store**: environment-first API key resolution with an OS
//!   keychain behind it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use unigen::{ContentGenerator, GenerateRequest, OllamaConfig, OllamaGenerator};
//!
//! #[tokio::main]
//! async fn main() -> unigen::Result<()> {
//!     let generator = OllamaGenerator::new(OllamaConfig::new("llama3.2"))?;
//!
//!     let request = GenerateRequest::from_text("Why is the sky blue?");
//!     let response = generator.generate_content(&request).await?;
//!     println!("{}", response.text());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | The unified request/response/message/part model |
//! | [`generator`] | Per-backend adapters behind [`ContentGenerator`] |
//! | [`drivers`] | Request translation and response normalization per backend |
//! | [`stream`] | Wire-chunk aggregation into partial responses |
//! | [`transport`] | HTTP plumbing, NDJSON and SSE decoding |
//! | [`tokens`] | Local token estimation |
//! | [`auth`] | Credential resolution and persistence |
//! | [`utils`] | Cancellation handles and small shared helpers |

pub mod auth;
pub mod drivers;
pub mod generator;
pub mod stream;
pub mod tokens;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export main types for convenience
pub use generator::{
    AnthropicConfig, AnthropicGenerator, ContentGenerator, OllamaConfig, OllamaGenerator,
    ToolSupport, ToolSupportState,
};
pub use types::{GenerateRequest, GenerateResponse, Message, Part, Role, ToolDeclaration};
pub use utils::{cancel_pair, CancelHandle, CancelToken};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Partial responses produced by streaming generation. The final item carries
/// the finish reason and settled usage.
pub type ResponseStream = BoxStream<'static, GenerateResponse>;

/// Error type for the library
pub mod error;
pub use error::Error;
