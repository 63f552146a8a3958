//! Compaction planning: how many of the oldest non-protected messages must be
//! summarized away to fit a target budget.
//!
//! The message list is split into a protected prefix and a compactable
//! suffix. The planned span always starts right after the prefix and always
//! leaves the last two compactable messages alone. When any boundary
//! computation comes out non-positive the planner prefers a no-op.

use crate::Message;
use crate::config::ContextConfig;
use crate::context::estimate::{estimate_message_tokens, estimate_total_tokens};
use tracing::debug;

/// Trailing compactable messages that compaction never consumes.
pub const MIN_KEPT_MESSAGES: usize = 2;

/// A contiguous span to compact: `messages[start..start + count]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompactionPlan {
    pub start: usize,
    pub count: usize,
}

impl CompactionPlan {
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.count == 0
    }

    /// End of the span (exclusive).
    pub fn end(&self) -> usize {
        self.start + self.count
    }
}

/// Decide which span to compact so the list fits under `target_tokens`.
pub fn plan_compaction(
    messages: &[Message],
    target_tokens: usize,
    config: &ContextConfig,
) -> CompactionPlan {
    let split = config.protected_message_count.min(messages.len());
    let (protected, compactable) = messages.split_at(split);

    let protected_tokens = estimate_total_tokens(protected);
    let compactable_tokens = estimate_total_tokens(compactable);

    if protected_tokens + compactable_tokens <= target_tokens {
        return CompactionPlan::noop();
    }
    if compactable.len() <= MIN_KEPT_MESSAGES {
        debug!(
            "Compaction plan: only {} compactable message(s), nothing to do",
            compactable.len()
        );
        return CompactionPlan::noop();
    }

    let max_compactable = compactable.len() - MIN_KEPT_MESSAGES;
    let max_kept =
        target_tokens as i64 - protected_tokens as i64 - config.summary_token_estimate as i64;

    if max_kept <= 0 {
        debug!(
            "Compaction plan: target {target_tokens} leaves no room after prefix ({protected_tokens}t) \
             and summary, compacting all but the last {MIN_KEPT_MESSAGES}"
        );
        return CompactionPlan {
            start: split,
            count: max_compactable,
        };
    }

    let to_remove = compactable_tokens as i64 - max_kept;
    if to_remove <= 0 {
        return CompactionPlan::noop();
    }

    let mut accumulated: i64 = 0;
    let mut count = 0;
    for msg in compactable {
        accumulated += estimate_message_tokens(msg) as i64;
        count += 1;
        if accumulated >= to_remove {
            break;
        }
    }
    let count = count.min(max_compactable);

    debug!(
        "Compaction plan: remove ~{to_remove}t, compacting {count} message(s) from index {split}"
    );
    CompactionPlan {
        start: split,
        count,
    }
}
