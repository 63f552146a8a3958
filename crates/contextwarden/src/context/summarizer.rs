//! AI-assisted compaction: summarize the planned span and splice the summary
//! in its place.
//!
//! The summarizer itself is an external collaborator behind the [`Summarize`]
//! trait. It is called synchronously and either returns text or fails; retry
//! and backoff are its own business. The span is passed by reference and the
//! list is only rewritten after a non-empty summary comes back, so a failure
//! (or cancellation surfaced as [`SummarizeError::Cancelled`]) leaves the
//! input exactly as it was.

use crate::Message;
use crate::config::ContextConfig;
use crate::context::estimate::{estimate_message_tokens, estimate_total_tokens};
use crate::context::planner::{CompactionPlan, plan_compaction};
use crate::{MessageContent, MessageRole};
use std::fmt::Write;
use tracing::debug;

/// Instruction sent to the summarizer as its system prompt.
pub const COMPACTION_PROMPT: &str = "\
You are performing a CONTEXT CHECKPOINT COMPACTION. Create a handoff summary for another \
LLM that will resume the task.

Include:
- Current progress and key decisions made
- Important context, constraints, or user preferences
- What remains to be done (clear next steps)
- Any critical data, examples, or references needed to continue
- Which files were modified and how
- Any errors encountered and how they were resolved

Be concise, structured, and focused on helping the next LLM seamlessly continue the work. \
Use bullet points and clear sections.";

/// Prefix of the synthetic summary message.
pub const SUMMARY_PREFIX: &str = "\
Another language model started to solve this problem and produced a summary of its thinking \
process. You also have access to the state of the tools that were used. Use this to build on \
the work that has already been done and avoid duplicating work.

Here is the summary from the previous context:

";

/// Why a summarization call produced no usable summary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummarizeError {
    /// Network failure, timeout, or unreadable response.
    #[error("summarizer transport error: {0}")]
    Transport(String),
    /// The model API answered with an error.
    #[error("summarizer API error: {0}")]
    Api(String),
    /// The model answered with no text.
    #[error("summarizer returned an empty summary")]
    EmptyResponse,
    /// The surrounding agent iteration was cancelled mid-call.
    #[error("summarization cancelled")]
    Cancelled,
    /// No summarizer is available (offline mode, missing credentials).
    #[error("summarizer unavailable: {0}")]
    Unavailable(String),
}

impl SummarizeError {
    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SummarizeError::Transport(_) | SummarizeError::EmptyResponse)
    }
}

/// Input to one summarization call.
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    /// Instruction to use as the summarizer's system prompt.
    pub instruction: &'a str,
    /// System prompt of the agent whose history is being compacted.
    pub system_prompt: &'a str,
    /// Messages to summarize, oldest first.
    pub span: &'a [Message],
}

impl SummaryRequest<'_> {
    /// Render the span as `[role]: text` blocks.
    ///
    /// Tool calls render as `name(arguments)`, image parts as `[image]`.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for msg in self.span {
            let _ = write!(out, "[{}]: ", msg.role);
            match &msg.content {
                Some(MessageContent::Text(text)) => out.push_str(text),
                Some(content @ MessageContent::Parts(_)) => {
                    let rendered: Vec<&str> = content
                        .parts()
                        .map(|p| match (&p.text, p.is_image()) {
                            (Some(text), _) => text.as_str(),
                            (None, true) => "[image]",
                            (None, false) => "",
                        })
                        .filter(|s| !s.is_empty())
                        .collect();
                    out.push_str(&rendered.join("\n"));
                }
                None | Some(MessageContent::Other(_)) if msg.tool_calls.is_none() => {
                    out.push_str("[no content]")
                }
                None | Some(MessageContent::Other(_)) => {}
            }
            if let Some(calls) = &msg.tool_calls {
                for call in calls {
                    let _ = write!(
                        out,
                        "\n-> {}({})",
                        call.function.name, call.function.arguments
                    );
                }
            }
            out.push_str("\n\n");
        }
        out
    }
}

/// Something that can turn a span of conversation into summary text.
///
/// Implementations block until the summary is available. They own their
/// retry policy; this crate treats each call as atomic.
pub trait Summarize {
    fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String, SummarizeError>;
}

/// A summarizer backed by a closure.
///
/// ```
/// use contextwarden::context::summarizer::{FnSummarizer, Summarize, SummaryRequest};
///
/// let summarizer = FnSummarizer::new(|request| Ok(format!("{} messages", request.span.len())));
/// let request = SummaryRequest { instruction: "", system_prompt: "", span: &[] };
/// assert_eq!(summarizer.summarize(&request).unwrap(), "0 messages");
/// ```
pub struct FnSummarizer<F>(F)
where
    F: Fn(&SummaryRequest<'_>) -> Result<String, SummarizeError>;

impl<F> FnSummarizer<F>
where
    F: Fn(&SummaryRequest<'_>) -> Result<String, SummarizeError>,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Summarize for FnSummarizer<F>
where
    F: Fn(&SummaryRequest<'_>) -> Result<String, SummarizeError>,
{
    fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String, SummarizeError> {
        (self.0)(request)
    }
}

/// A summarizer that always fails with [`SummarizeError::Unavailable`].
pub struct UnavailableSummarizer(pub String);

impl Summarize for UnavailableSummarizer {
    fn summarize(&self, _request: &SummaryRequest<'_>) -> Result<String, SummarizeError> {
        Err(SummarizeError::Unavailable(self.0.clone()))
    }
}

/// Build the synthetic message that carries a summary.
pub fn summary_message(summary: &str) -> Message {
    Message::user(format!("{SUMMARY_PREFIX}{summary}"))
}

/// Whether a message is a synthetic compaction summary.
pub fn is_summary_message(msg: &Message) -> bool {
    msg.is_role(MessageRole::User)
        && matches!(&msg.content, Some(MessageContent::Text(s)) if s.starts_with(SUMMARY_PREFIX))
}

/// How a compaction attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CompactionResult {
    /// The plan was a no-op; the summarizer was not called.
    NotNeeded,
    /// The span was replaced by one summary message.
    Compacted {
        plan: CompactionPlan,
        /// Estimated tokens of the removed span.
        removed_tokens: usize,
        /// Estimated tokens of the summary message.
        summary_tokens: usize,
    },
    /// The summarizer failed; the input is returned unchanged.
    Failed {
        plan: CompactionPlan,
        error: SummarizeError,
    },
}

/// Messages after a compaction attempt plus what happened.
#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub messages: Vec<Message>,
    pub result: CompactionResult,
}

/// Plan, summarize, and splice.
///
/// Returns `protected + [summary] + kept` on success. On a no-op plan or a
/// summarizer failure the input comes back untouched.
pub fn compact(
    summarizer: &dyn Summarize,
    messages: Vec<Message>,
    system_prompt: &str,
    target_tokens: usize,
    config: &ContextConfig,
) -> CompactionOutcome {
    let plan = plan_compaction(&messages, target_tokens, config);
    execute_compaction(summarizer, messages, plan, system_prompt)
}

/// Summarize `plan`'s span and splice the summary in its place.
pub fn execute_compaction(
    summarizer: &dyn Summarize,
    mut messages: Vec<Message>,
    plan: CompactionPlan,
    system_prompt: &str,
) -> CompactionOutcome {
    if plan.is_noop() || plan.end() > messages.len() {
        debug!("No messages need compaction");
        return CompactionOutcome {
            messages,
            result: CompactionResult::NotNeeded,
        };
    }

    let span = &messages[plan.start..plan.end()];
    let removed_tokens = estimate_total_tokens(span);
    let request = SummaryRequest {
        instruction: COMPACTION_PROMPT,
        system_prompt,
        span,
    };

    let summary = match summarizer.summarize(&request) {
        Ok(text) if text.trim().is_empty() => Err(SummarizeError::EmptyResponse),
        other => other,
    };

    let summary = match summary {
        Ok(summary) => summary,
        Err(error) => {
            debug!(
                "Compaction of {} message(s) failed, keeping history as is: {error}",
                plan.count
            );
            return CompactionOutcome {
                messages,
                result: CompactionResult::Failed { plan, error },
            };
        }
    };

    let summary_msg = summary_message(&summary);
    let summary_tokens = estimate_message_tokens(&summary_msg);
    messages.splice(plan.start..plan.end(), std::iter::once(summary_msg));

    debug!(
        "Compacted {} message(s) (~{removed_tokens} tokens) into a ~{summary_tokens} token summary; \
         {} message(s) remain (~{} tokens)",
        plan.count,
        messages.len(),
        estimate_total_tokens(&messages),
    );

    CompactionOutcome {
        messages,
        result: CompactionResult::Compacted {
            plan,
            removed_tokens,
            summary_tokens,
        },
    }
}
