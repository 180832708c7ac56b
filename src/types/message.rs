//! Message and content-part types for the unified conversation model.
//!
//! A [`Message`] is one conversation turn: a [`Role`] plus an ordered list of
//! [`Part`]s. Parts are heterogeneous so a single model turn can interleave
//! prose and function calls, and a tool turn can carry several results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Out-of-band instruction folded into the backend's system channel.
    System,
    /// The human (or calling application) side of the conversation.
    User,
    /// The model's own output, including any function calls it issued.
    Model,
    /// Results produced by executing the model's function calls.
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One typed fragment of a conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Plain text.
    Text { text: String },
    /// A function invocation requested by the model.
    FunctionCall {
        name: String,
        #[serde(default)]
        args: Map<String, Value>,
        /// Correlation id echoed back in the matching response. Backends
        /// that do not issue ids leave this `None`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// The outcome of executing a previously issued function call.
    FunctionResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        response: Map<String, Value>,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn function_call(name: impl Into<String>, args: Map<String, Value>) -> Self {
        Part::FunctionCall {
            name: name.into(),
            args,
            id: None,
        }
    }

    pub fn function_call_with_id(
        name: impl Into<String>,
        args: Map<String, Value>,
        id: impl Into<String>,
    ) -> Self {
        Part::FunctionCall {
            name: name.into(),
            args,
            id: Some(id.into()),
        }
    }

    pub fn function_response(id: Option<String>, response: Map<String, Value>) -> Self {
        Part::FunctionResponse { id, response }
    }

    /// Text content, if this is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall { .. })
    }

    pub fn is_function_response(&self) -> bool {
        matches!(self, Part::FunctionResponse { .. })
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// A user turn holding a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// A model turn holding a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    /// A system turn holding a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    /// A tool turn carrying function results.
    pub fn tool(parts: Vec<Part>) -> Self {
        Self::new(Role::Tool, parts)
    }

    /// Concatenated text of every text part, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_function_call())
    }

    pub fn has_function_response(&self) -> bool {
        self.parts.iter().any(Part::is_function_response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Model).unwrap(), "\"model\"");
        assert_eq!(serde_json::from_str::<Role>("\"tool\"").unwrap(), Role::Tool);
    }

    #[test]
    fn test_part_tagged_serialization() {
        let part = Part::text("hello");
        let value = serde_json::to_value(&part).unwrap();
        assert_eq!(value, json!({"type": "text", "text": "hello"}));

        let mut args = Map::new();
        args.insert("city".to_string(), json!("Tokyo"));
        let call = Part::function_call_with_id("get_weather", args, "call_1");
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "function_call");
        assert_eq!(value["name"], "get_weather");
        assert_eq!(value["args"]["city"], "Tokyo");
        assert_eq!(value["id"], "call_1");
    }

    #[test]
    fn test_function_call_id_omitted_when_absent() {
        let call = Part::function_call("noop", Map::new());
        let value = serde_json::to_value(&call).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_message_text_concatenates_in_order() {
        let message = Message::new(
            Role::Model,
            vec![
                Part::text("Hello, "),
                Part::function_call("lookup", Map::new()),
                Part::text("world"),
            ],
        );
        assert_eq!(message.text(), "Hello, world");
        assert_eq!(message.function_calls().count(), 1);
    }

    #[test]
    fn test_has_function_response() {
        let turn = Message::tool(vec![Part::function_response(
            Some("call_1".to_string()),
            Map::new(),
        )]);
        assert!(turn.has_function_response());
        assert!(!Message::user("hi").has_function_response());
    }
}
