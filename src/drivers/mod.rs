//! 后端负载转换层 — 统一请求与各后端线格式之间的纯函数翻译
//!
//! Backend payload translation layer. Each submodule converts the unified
//! request into one backend's wire format and normalizes that backend's
//! responses and stream events back into unified types. Translation is pure:
//! no I/O, no shared state, fully deterministic for a given request and
//! tool-support flag.
//!
//! Shared rules applied by every backend:
//! - The system instruction (string or structured parts) collapses to one
//!   system string; an empty result omits the system field entirely.
//! - While tool support is off, function-call parts are dropped and messages
//!   carrying function responses are skipped wholesale.
//! - Messages whose translated content would be empty are omitted; backends
//!   never see a blank turn.
//! - Temperature and max-token options are forwarded only when set.

pub mod anthropic;
pub mod ollama;

use serde_json::{json, Value};

use crate::types::SystemInstruction;

/// Collapse the system instruction into the single string backends accept.
pub(crate) fn render_system(instruction: Option<&SystemInstruction>) -> Option<String> {
    let joined = instruction?.joined_text();
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

/// Schema attached to tool declarations that did not bring their own.
pub(crate) fn default_tool_schema() -> Value {
    json!({"type": "object", "properties": {}})
}
