//! Context-window budget manager for LLM-driven agent loops.
//!
//! An agent conversation grows without bound: system prompt, user turns,
//! assistant turns, and (above all) tool results. `contextwarden` keeps that
//! conversation inside the model's token window by applying tiered reduction
//! right before each model request:
//!
//! 1. **Estimate**: [`context::estimate`] approximates token cost at four
//!    characters per token, with fixed surcharges for images and per-message
//!    overhead.
//! 2. **Detect**: [`ContextBudget`](context::ContextBudget) compares the
//!    estimate against a fraction of the usable window.
//! 3. **Prune**: [`context::eviction`] scans backward and replaces stale tool
//!    output with a fixed sentinel. No LLM call, no messages removed.
//! 4. **Compact**: [`context::planner`] picks the oldest span of
//!    non-protected messages to drop, and [`context::summarizer`] replaces it
//!    with one synthetic summary produced by an external [`Summarize`]
//!    implementation.
//!
//! [`ContextManager`](context::ContextManager) composes the four steps. It is
//! synchronous and call-scoped: all state lives in the message list the caller
//! passes in.
//!
//! # Getting started
//!
//! ```ignore
//! use contextwarden::prelude::*;
//!
//! let config = ContextConfig::default().with_context_limit(128_000);
//! let manager = ContextManager::new(config);
//!
//! let summarizer = FnSummarizer::new(|request| {
//!     my_llm_call(request.instruction, &request.transcript())
//! });
//!
//! let outcome = manager.manage(messages, "You are a coding agent.", &summarizer, false);
//! if let ContextAction::CompactionFailed { error, .. } = &outcome.action {
//!     tracing::warn!("context stays oversized this round: {error}");
//! }
//! let messages = outcome.messages;
//! ```
//!
//! # Invariants
//!
//! - The first `protected_message_count` messages are never touched.
//! - Pruning only rewrites the `content` of tool messages.
//! - Compaction replaces one contiguous span with exactly one message and always
//!   keeps the last two compactable messages.
//! - A failed summarization leaves the (pruned) list exactly as it was.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | [`ContextConfig`](config::ContextConfig), the single source of limits and thresholds |
//! | [`context`] | Estimation, overflow detection, pruning, compaction planning and execution, the manager |
//! | [`events`] | [`ContextEvent`](events::ContextEvent) and handlers for observing decisions |
//! | [`api`] | OpenRouter-backed [`Summarize`] implementation with retry |

pub mod api;
pub mod config;
pub mod context;
pub mod events;
pub mod prelude;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

pub use context::summarizer::{Summarize, SummarizeError, SummaryRequest};

/// Extra JSON keys carried through untouched.
pub type ExtraFields = serde_json::Map<String, serde_json::Value>;

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
///
/// Open-ended: roles this crate has no rule for (`developer`, provider
/// extensions) deserialize as [`MessageRole::Other`], are treated like any
/// other unprotected message, and serialize back unchanged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
    Other(String),
}

impl MessageRole {
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
            MessageRole::Other(role) => role,
        }
    }
}

impl From<String> for MessageRole {
    fn from(role: String) -> Self {
        match role.as_str() {
            "system" => MessageRole::System,
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => MessageRole::Other(role),
        }
    }
}

impl From<MessageRole> for String {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::Other(role) => role,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message content: a plain string or an ordered list of parts.
///
/// Anything else (an explicit `null`, an object, a number) is kept verbatim in
/// [`MessageContent::Other`] and counts as zero tokens.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentItem>),
    Other(serde_json::Value),
}

impl MessageContent {
    /// Plain-text view. Text parts are joined with newlines; non-text parts
    /// and unrecognized content are skipped.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(items) => {
                let texts: Vec<&str> = items
                    .iter()
                    .filter_map(ContentItem::as_part)
                    .filter_map(|p| p.text.as_deref())
                    .collect();
                texts.join("\n")
            }
            MessageContent::Other(_) => String::new(),
        }
    }

    /// Typed parts of a multi-part content, skipping raw entries.
    pub fn parts(&self) -> impl Iterator<Item = &ContentPart> {
        let items: &[ContentItem] = match self {
            MessageContent::Parts(items) => items.as_slice(),
            _ => &[],
        };
        items.iter().filter_map(ContentItem::as_part)
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// Part type tag for text parts.
pub const PART_TEXT: &str = "text";
/// Part type tag for image parts.
pub const PART_IMAGE_URL: &str = "image_url";

/// One element of a multi-part message.
///
/// Loosely typed: unknown part types and extra keys survive a round trip, and
/// a part with no `text` counts as zero text tokens.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub part_type: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub image_url: Option<serde_json::Value>,
    #[serde(flatten, default)]
    pub extra: ExtraFields,
}

/// One entry of a part array: a typed part, or anything else kept verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ContentItem {
    Part(ContentPart),
    Raw(serde_json::Value),
}

impl ContentItem {
    pub fn as_part(&self) -> Option<&ContentPart> {
        match self {
            ContentItem::Part(part) => Some(part),
            ContentItem::Raw(_) => None,
        }
    }
}

impl From<ContentPart> for ContentItem {
    fn from(part: ContentPart) -> Self {
        ContentItem::Part(part)
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            part_type: PART_TEXT.to_string(),
            text: Some(text.into()),
            image_url: None,
            extra: ExtraFields::new(),
        }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self {
            part_type: PART_IMAGE_URL.to_string(),
            text: None,
            image_url: Some(serde_json::json!({ "url": url.into() })),
            extra: ExtraFields::new(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.part_type == PART_IMAGE_URL
    }
}

/// A message in the conversation.
///
/// Fields this crate does not own (`name`, `cache_control`, provider
/// extensions) are kept in `extra` and serialized back unchanged. A missing
/// `content` key stays missing; an explicit `"content": null` is kept as
/// `Some(MessageContent::Other(Value::Null))` and written back as `null`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        deserialize_with = "deserialize_present"
    )]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
    #[serde(flatten, default)]
    pub extra: ExtraFields,
}

/// Any present value, `null` included, becomes `Some`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<MessageContent>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    MessageContent::deserialize(deserializer).map(Some)
}

impl Message {
    fn with_content(role: MessageRole, content: MessageContent) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            extra: ExtraFields::new(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(MessageRole::System, MessageContent::Text(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(MessageRole::User, MessageContent::Text(content.into()))
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_content(
            MessageRole::User,
            MessageContent::Parts(parts.into_iter().map(ContentItem::from).collect()),
        )
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::with_content(MessageRole::Assistant, MessageContent::Text(content.into()))
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: None,
            tool_calls: Some(calls),
            tool_call_id: None,
            extra: ExtraFields::new(),
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(MessageContent::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            extra: ExtraFields::new(),
        }
    }

    pub fn is_role(&self, role: MessageRole) -> bool {
        self.role == role
    }

    /// Plain-text view of the content; see [`MessageContent::to_text`].
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().map(MessageContent::to_text)
    }

    /// True when the content is exactly the given plain string.
    pub fn content_is(&self, expected: &str) -> bool {
        matches!(&self.content, Some(MessageContent::Text(s)) if s == expected)
    }
}

// ── Tool call types ────────────────────────────────────────────────

/// The type of a tool call. `function` in practice; other tags are kept.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum CallType {
    #[default]
    Function,
    Other(String),
}

impl From<String> for CallType {
    fn from(tag: String) -> Self {
        if tag == "function" {
            CallType::Function
        } else {
            CallType::Other(tag)
        }
    }
}

impl From<CallType> for String {
    fn from(tag: CallType) -> Self {
        match tag {
            CallType::Function => "function".to_string(),
            CallType::Other(tag) => tag,
        }
    }
}

/// A tool call requested by the assistant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub call_type: CallType,
    #[serde(default)]
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: CallArguments::Encoded(arguments.into()),
            },
        }
    }
}

/// Function name plus its arguments.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct FunctionCallData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: CallArguments,
}

/// Tool-call arguments: normally a JSON-encoded string, but some providers
/// send the object itself. Either form serializes back as received.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum CallArguments {
    Encoded(String),
    Raw(serde_json::Value),
}

impl Default for CallArguments {
    fn default() -> Self {
        CallArguments::Encoded(String::new())
    }
}

impl CallArguments {
    /// Text form used for estimation and transcripts. `null` is empty.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            CallArguments::Encoded(s) => Cow::Borrowed(s),
            CallArguments::Raw(serde_json::Value::Null) => Cow::Borrowed(""),
            CallArguments::Raw(value) => Cow::Owned(value.to_string()),
        }
    }
}

impl std::fmt::Display for CallArguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_text())
    }
}
