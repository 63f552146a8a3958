//! Tool output pruning: replace stale tool results with a fixed sentinel.
//!
//! Tool results are the single largest context consumer in any agent loop.
//! A file read can inject 30KB; a grep can return hundreds of lines. Most of
//! it is irrelevant once the model has acted on it. Pruning clears the content
//! of old tool messages in place: no LLM call, no messages removed, no
//! reordering.
//!
//! The scan runs newest to oldest:
//!
//! 1. The most recent `protect_last_turns` user turns are skipped entirely.
//! 2. Older tool outputs accumulate into a running total. Outputs beyond the
//!    first `prune_protect` tokens are marked for eviction.
//! 3. The first sentinel found ends the scan. Everything older was handled by
//!    an earlier pass, which keeps repeated passes linear overall.
//! 4. Marks are committed only if the recoverable total strictly exceeds
//!    `prune_minimum`. Otherwise the list is left alone.

use crate::config::ContextConfig;
use crate::context::estimate::estimate_content_tokens;
use crate::{Message, MessageContent, MessageRole};
use tracing::debug;

/// Content written over evicted tool results.
///
/// Both the writer and the "already pruned?" check reference this constant so
/// they can't drift out of sync.
pub const PRUNE_MARKER: &str = "[Old tool result content cleared]";

/// What a prune scan found and whether it was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Tool-output tokens seen outside the protected turns.
    pub scanned_tokens: usize,
    /// Tokens held by the marked messages.
    pub recoverable_tokens: usize,
    /// Indices marked for eviction, newest first.
    pub evicted: Vec<usize>,
    /// Whether the marks were written.
    pub committed: bool,
    /// Whether the scan stopped at an existing sentinel.
    pub halted_at_marker: bool,
}

impl PruneReport {
    pub fn evicted_count(&self) -> usize {
        if self.committed { self.evicted.len() } else { 0 }
    }
}

/// Whether a message is a tool result that was already pruned.
pub fn is_pruned(msg: &Message) -> bool {
    msg.is_role(MessageRole::Tool) && msg.content_is(PRUNE_MARKER)
}

/// Scan without mutating. The returned report is never `committed`.
pub fn plan_prune(messages: &[Message], config: &ContextConfig) -> PruneReport {
    let mut report = PruneReport::default();
    let mut turns = 0;

    for (index, msg) in messages.iter().enumerate().rev() {
        if index < config.protected_message_count {
            break;
        }

        if msg.is_role(MessageRole::User) {
            turns += 1;
        }
        if turns < config.protect_last_turns {
            continue;
        }
        if !msg.is_role(MessageRole::Tool) {
            continue;
        }

        if msg.content_is(PRUNE_MARKER) {
            report.halted_at_marker = true;
            break;
        }

        let tokens = estimate_content_tokens(msg.content.as_ref());
        report.scanned_tokens += tokens;
        if report.scanned_tokens > config.prune_protect {
            report.recoverable_tokens += tokens;
            report.evicted.push(index);
        }
    }

    debug!(
        "Prune scan: {} tool tokens, {} recoverable across {} message(s){}",
        report.scanned_tokens,
        report.recoverable_tokens,
        report.evicted.len(),
        if report.halted_at_marker {
            " (stopped at earlier prune)"
        } else {
            ""
        },
    );
    report
}

/// Prune old tool outputs in place.
///
/// Returns the scan report; `committed` tells whether anything was written.
/// When recovery does not clear `prune_minimum` the slice is untouched.
pub fn prune_tool_outputs(messages: &mut [Message], config: &ContextConfig) -> PruneReport {
    let mut report = plan_prune(messages, config);

    if report.recoverable_tokens <= config.prune_minimum {
        debug!(
            "Prune skipped: only {} tokens recoverable (min: {})",
            report.recoverable_tokens, config.prune_minimum
        );
        return report;
    }

    for &index in &report.evicted {
        if let Some(msg) = messages.get_mut(index) {
            msg.content = Some(MessageContent::Text(PRUNE_MARKER.to_string()));
        }
    }
    report.committed = true;

    debug!(
        "Pruned {} tool output(s), recovering ~{} tokens",
        report.evicted.len(),
        report.recoverable_tokens
    );
    report
}
