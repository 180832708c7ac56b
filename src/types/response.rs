//! The unified generation response.
//!
//! The same shape serves both the one-shot and the streaming path: a
//! streaming sequence is simply a series of partial responses, the last of
//! which carries a finish reason.

use serde::{Deserialize, Serialize};

use super::message::{Message, Part, Role};

/// Why the model stopped producing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of turn.
    Stop,
    /// The configured output budget was exhausted.
    MaxTokens,
    /// The model stopped to issue one or more function calls.
    ToolCall,
    /// Backend-specific reason passed through unmapped.
    Other(String),
}

/// Token accounting as reported by the backend, zero when unreported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: u64,
    pub candidate_tokens: u64,
    pub total_tokens: u64,
}

impl UsageMetadata {
    pub fn totaled(prompt_tokens: u64, candidate_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            candidate_tokens,
            total_tokens: prompt_tokens + candidate_tokens,
        }
    }
}

/// One generated alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Message,
    /// Present on the final chunk of a stream and on one-shot responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

impl Candidate {
    pub fn new(content: Message, finish_reason: Option<FinishReason>) -> Self {
        Self {
            content,
            finish_reason,
        }
    }
}

/// A normalized backend response, complete or partial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub usage: UsageMetadata,
}

impl GenerateResponse {
    /// A single-candidate response with `Role::Model` content.
    pub fn from_parts(
        parts: Vec<Part>,
        finish_reason: Option<FinishReason>,
        usage: UsageMetadata,
    ) -> Self {
        Self {
            candidates: vec![Candidate::new(Message::new(Role::Model, parts), finish_reason)],
            usage,
        }
    }

    /// Concatenated text of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .map(|c| c.content.text())
            .unwrap_or_default()
    }

    /// Function-call parts of the first candidate.
    pub fn function_calls(&self) -> Vec<&Part> {
        self.candidates
            .first()
            .map(|c| c.content.function_calls().collect())
            .unwrap_or_default()
    }

    /// Finish reason of the first candidate, if any.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.candidates.first().and_then(|c| c.finish_reason.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_totaled() {
        let usage = UsageMetadata::totaled(26, 298);
        assert_eq!(usage.total_tokens, 324);
    }

    #[test]
    fn test_finish_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&FinishReason::MaxTokens).unwrap(),
            "\"max_tokens\""
        );
        let other: FinishReason =
            serde_json::from_str("{\"other\":\"content_filter\"}").unwrap();
        assert_eq!(other, FinishReason::Other("content_filter".to_string()));
    }

    #[test]
    fn test_accessors_on_empty_response() {
        let response = GenerateResponse {
            candidates: vec![],
            usage: UsageMetadata::default(),
        };
        assert_eq!(response.text(), "");
        assert!(response.function_calls().is_empty());
        assert!(response.finish_reason().is_none());
    }

    #[test]
    fn test_from_parts_builds_model_candidate() {
        let response = GenerateResponse::from_parts(
            vec![Part::text("hi")],
            Some(FinishReason::Stop),
            UsageMetadata::totaled(3, 1),
        );
        assert_eq!(response.candidates[0].content.role, Role::Model);
        assert_eq!(response.text(), "hi");
        assert_eq!(response.finish_reason(), Some(&FinishReason::Stop));
    }
}
