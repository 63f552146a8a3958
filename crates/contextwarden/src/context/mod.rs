//! Context window management: estimation, overflow detection, pruning, and
//! compaction.
//!
//! The context window is the scarcest resource in any LLM agent. This module
//! keeps a conversation under it with tiered strategies, cheapest first:
//!
//! 1. **[`estimate`]**: character-based token estimates for text, parts, and
//!    whole messages. Approximate on purpose.
//!
//! 2. **[`budget`]**: [`ContextBudget`] decides whether the estimated total
//!    is over the configured fraction of the usable window.
//!
//! 3. **[`eviction`]**: replaces stale tool output with a fixed sentinel.
//!    No LLM call, no messages removed.
//!
//! 4. **[`planner`]** and **[`summarizer`]**: pick the oldest span of
//!    non-protected messages and replace it with one AI-written summary.
//!
//! [`ContextManager`] runs them in that order once per agent iteration, and
//! [`Conversation`] wraps a single agent's history around it.

pub mod budget;
pub mod conversation;
pub mod estimate;
pub mod eviction;
pub mod manager;
pub mod planner;
pub mod summarizer;

pub use budget::{ContextBudget, ContextUsage};
pub use conversation::{ContextBreakdown, Conversation};
pub use estimate::{estimate_message_tokens, estimate_tokens, estimate_total_tokens};
pub use eviction::{PRUNE_MARKER, PruneReport, prune_tool_outputs};
pub use manager::{ContextAction, ContextManager, ManageOptions, ManageOutcome};
pub use planner::{CompactionPlan, plan_compaction};
pub use summarizer::{CompactionOutcome, CompactionResult, compact};
