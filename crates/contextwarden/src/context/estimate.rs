//! Token estimation.
//!
//! An approximation, not a tokenizer: four characters per token, a flat
//! surcharge per image part, and a fixed per-message overhead for the role
//! and framing. Every function here is pure. Missing or malformed fields
//! contribute zero rather than failing.

use crate::{Message, MessageContent};

/// Characters per token for estimation.
pub const CHARS_PER_TOKEN: usize = 4;

/// Flat cost charged for each image part.
pub const IMAGE_PART_TOKENS: usize = 1000;

/// Per-message overhead (role, separators).
pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate tokens for a piece of text: `floor(chars / 4)`.
///
/// ```
/// use contextwarden::context::estimate::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abc"), 0);
/// assert_eq!(estimate_tokens("abcdefgh"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / CHARS_PER_TOKEN
}

/// Estimate tokens for message content alone (no tool calls, no overhead).
pub fn estimate_content_tokens(content: Option<&MessageContent>) -> usize {
    match content {
        None | Some(MessageContent::Other(_)) => 0,
        Some(MessageContent::Text(text)) => estimate_tokens(text),
        Some(content @ MessageContent::Parts(_)) => content
            .parts()
            .map(|part| {
                let text_tokens = part.text.as_deref().map_or(0, estimate_tokens);
                let image_tokens = if part.is_image() { IMAGE_PART_TOKENS } else { 0 };
                text_tokens + image_tokens
            })
            .sum(),
    }
}

/// Estimate tokens for one message: content, tool-call names and arguments,
/// plus the fixed overhead.
pub fn estimate_message_tokens(msg: &Message) -> usize {
    let content = estimate_content_tokens(msg.content.as_ref());
    let calls: usize = msg.tool_calls.as_ref().map_or(0, |calls| {
        calls
            .iter()
            .map(|tc| {
                estimate_tokens(&tc.function.name)
                    + estimate_tokens(&tc.function.arguments.as_text())
            })
            .sum()
    });
    content + calls + MESSAGE_OVERHEAD_TOKENS
}

/// Estimate total tokens for a slice of messages.
pub fn estimate_total_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentPart, ToolCall};

    #[test]
    fn text_estimate_floors() {
        for len in 0..40 {
            let text = "x".repeat(len);
            assert_eq!(estimate_tokens(&text), len / 4);
        }
    }

    #[test]
    fn text_estimate_is_monotonic() {
        let mut last = 0;
        for len in 0..200 {
            let now = estimate_tokens(&"y".repeat(len));
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn counts_chars_not_bytes() {
        // Four 3-byte characters.
        assert_eq!(estimate_tokens("€€€€"), 1);
    }

    #[test]
    fn plain_message_adds_overhead() {
        let msg = Message::user("a".repeat(400));
        assert_eq!(estimate_message_tokens(&msg), 100 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn image_parts_carry_surcharge() {
        let msg = Message::user_parts(vec![
            ContentPart::text("b".repeat(40)),
            ContentPart::image_url("https://example.com/x.png"),
        ]);
        assert_eq!(
            estimate_message_tokens(&msg),
            10 + IMAGE_PART_TOKENS + MESSAGE_OVERHEAD_TOKENS
        );
    }

    #[test]
    fn tool_calls_count_name_and_arguments() {
        let msg = Message::assistant_tool_calls(vec![ToolCall::function(
            "c1",
            "read_file",                     // 9 chars -> 2
            r#"{"path":"src/main.rs"}"#, // 22 chars -> 5
        )]);
        assert_eq!(estimate_message_tokens(&msg), 2 + 5 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn missing_content_is_overhead_only() {
        let msg = Message {
            content: None,
            ..Message::user("")
        };
        assert_eq!(estimate_message_tokens(&msg), MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn malformed_fields_degrade_to_zero() {
        let messages: Vec<Message> = serde_json::from_value(serde_json::json!([
            {"role": "developer", "content": "a".repeat(40)},
            {"role": "user", "content": {"unexpected": 1}},
            {"role": "user", "content": ["bare", 7, {"type": "text", "text": "b".repeat(8)}]},
            {"role": "assistant", "content": null, "tool_calls": [
                {"id": "c1", "function": {"name": "grep", "arguments": {"q": "abcdefg"}}}
            ]}
        ]))
        .unwrap();

        assert_eq!(estimate_message_tokens(&messages[0]), 10 + MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(estimate_message_tokens(&messages[1]), MESSAGE_OVERHEAD_TOKENS);
        assert_eq!(estimate_message_tokens(&messages[2]), 2 + MESSAGE_OVERHEAD_TOKENS);
        // `{"q":"abcdefg"}` is 15 chars.
        assert_eq!(estimate_message_tokens(&messages[3]), 1 + 3 + MESSAGE_OVERHEAD_TOKENS);
    }

    #[test]
    fn total_sums_messages() {
        let messages = vec![Message::system("a".repeat(8)), Message::user("b".repeat(16))];
        assert_eq!(
            estimate_total_tokens(&messages),
            2 + 4 + 2 * MESSAGE_OVERHEAD_TOKENS
        );
        assert_eq!(estimate_total_tokens(&[]), 0);
    }
}
