//! 类型系统模块：定义与后端无关的统一内容生成数据模型。
//!
//! # Types Module
//!
//! This module defines the backend-independent data model for content
//! generation. Callers build requests and consume responses in these types
//! only; everything backend-specific stays inside the driver and transport
//! layers.
//!
//! ## Overview
//!
//! The type system ensures:
//! - One request/response shape shared by every backend
//! - Typed content parts (text, function call, function result)
//! - A streaming chunk format identical to the one-shot response
//! - Serialization-friendly structures throughout
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GenerateRequest`] | Complete generation request (system, messages, tools, options) |
//! | [`GenerateResponse`] | Normalized response: candidates plus usage counters |
//! | [`Message`] | One conversation turn: role plus ordered parts |
//! | [`Part`] | Text, function call, or function response fragment |
//! | [`ToolDeclaration`] | Function the model may invoke |
//! | [`FinishReason`] | Why generation stopped |
//!
//! ## Submodules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`message`] | Conversation turns and content parts |
//! | [`request`] | Request, system instruction, generation options |
//! | [`response`] | Response, candidates, finish reasons, usage |
//! | [`tool`] | Tool declarations for function calling |
//!
//! ## Example
//!
//! ```rust
//! use unigen::types::{GenerateRequest, Message, ToolDeclaration};
//!
//! let request = GenerateRequest::new(vec![Message::user("Weather in Tokyo?")])
//!     .system("Answer briefly.")
//!     .tools(vec![ToolDeclaration::new("get_weather")
//!         .description("Current weather for a city")
//!         .parameters(serde_json::json!({
//!             "type": "object",
//!             "properties": {"city": {"type": "string"}}
//!         }))])
//!     .temperature(0.2);
//! assert!(request.declares_tools());
//! ```

pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use message::{Message, Part, Role};
pub use request::{GenerateRequest, GenerationOptions, SystemInstruction};
pub use response::{Candidate, FinishReason, GenerateResponse, UsageMetadata};
pub use tool::ToolDeclaration;
