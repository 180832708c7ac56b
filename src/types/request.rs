//! The unified generation request.

use serde::{Deserialize, Serialize};

use super::message::{Message, Part};
use super::tool::ToolDeclaration;

/// A complete, backend-independent generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,
    pub messages: Vec<Message>,
    /// Tools offered to the model. `None` and `Some(vec![])` both mean
    /// "no tools"; declarations only reach the wire while the adapter
    /// still believes the backend supports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDeclaration>>,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl GenerateRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            system_instruction: None,
            messages,
            tools: None,
            options: GenerationOptions::default(),
        }
    }

    /// Single user turn with no system instruction or tools.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Message::user(text)])
    }

    pub fn system(mut self, instruction: impl Into<SystemInstruction>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }

    pub fn tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    /// Whether any tool declarations are actually present.
    pub fn declares_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// System-level guidance, either a plain string or structured parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemInstruction {
    Text(String),
    Parts(Vec<Part>),
}

impl SystemInstruction {
    /// Text fragments joined in order; non-text parts are skipped.
    pub fn joined_text(&self) -> String {
        match self {
            SystemInstruction::Text(text) => text.clone(),
            SystemInstruction::Parts(parts) => parts
                .iter()
                .filter_map(Part::as_text)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for SystemInstruction {
    fn from(text: String) -> Self {
        SystemInstruction::Text(text)
    }
}

impl From<&str> for SystemInstruction {
    fn from(text: &str) -> Self {
        SystemInstruction::Text(text.to_string())
    }
}

impl From<Vec<Part>> for SystemInstruction {
    fn from(parts: Vec<Part>) -> Self {
        SystemInstruction::Parts(parts)
    }
}

/// Sampling and length controls shared by every backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}
