//! Heuristic token estimation.
//!
//! Backends in this crate expose no metered tokenizer endpoint, so token
//! counts are approximated from character counts at roughly four characters
//! per token. The estimate is deterministic and side-effect free; it feeds
//! context-window bookkeeping, not billing.

use serde_json::Value;

use crate::types::{GenerateRequest, Part};

/// Average characters per token assumed by [`estimate_request_tokens`].
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Estimated token count for a piece of text: `ceil(chars / 4)`.
pub fn estimate_text_tokens(text: &str) -> u64 {
    let chars = text.chars().count();
    (chars as f64 / CHARS_PER_TOKEN).ceil() as u64
}

/// Estimated token count for a whole request.
///
/// Counts every text part plus the stringified payload of every function
/// call and function response, joined with single spaces. An empty request
/// estimates to zero.
pub fn estimate_request_tokens(request: &GenerateRequest) -> u64 {
    let mut pieces: Vec<String> = Vec::new();
    if let Some(instruction) = &request.system_instruction {
        let joined = instruction.joined_text();
        if !joined.is_empty() {
            pieces.push(joined);
        }
    }
    for message in &request.messages {
        for part in &message.parts {
            match part {
                Part::Text { text } => pieces.push(text.clone()),
                Part::FunctionCall { name, args, .. } => {
                    pieces.push(name.clone());
                    pieces.push(stringify(&Value::Object(args.clone())));
                }
                Part::FunctionResponse { response, .. } => {
                    pieces.push(stringify(&Value::Object(response.clone())));
                }
            }
        }
    }
    estimate_text_tokens(&pieces.join(" "))
}

fn stringify(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use serde_json::json;

    #[test]
    fn test_eight_chars_is_two_tokens() {
        assert_eq!(estimate_text_tokens("12345678"), 2);
    }

    #[test]
    fn test_rounds_up() {
        assert_eq!(estimate_text_tokens("123456789"), 3);
        assert_eq!(estimate_text_tokens("1"), 1);
    }

    #[test]
    fn test_empty_request_is_zero() {
        let request = GenerateRequest::new(vec![]);
        assert_eq!(estimate_request_tokens(&request), 0);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        // Four three-byte characters estimate as one token.
        assert_eq!(estimate_text_tokens("你好世界"), 1);
    }

    #[test]
    fn test_single_part_request() {
        let request = GenerateRequest::new(vec![Message::user("12345678")]);
        assert_eq!(estimate_request_tokens(&request), 2);
    }

    #[test]
    fn test_function_payloads_are_counted() {
        let mut args = serde_json::Map::new();
        args.insert("city".to_string(), json!("Tokyo"));
        let with_call = GenerateRequest::new(vec![Message::new(
            crate::types::Role::Model,
            vec![Part::function_call("get_weather", args)],
        )]);
        let without_call = GenerateRequest::new(vec![]);
        assert!(estimate_request_tokens(&with_call) > estimate_request_tokens(&without_call));
    }
}
