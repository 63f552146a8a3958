//! Per-iteration orchestration: detect overflow, prune, then compact.
//!
//! [`ContextManager::manage`] is called once per agent-loop iteration before
//! the next model request. When usage is under the threshold (and compaction
//! isn't forced) the list comes back untouched without any pruning or
//! summarizer call. Otherwise cheap pruning runs first; compaction only runs
//! if pruning did not resolve the overflow or the caller forced it.
//!
//! A failed summarizer call is never fatal: the caller gets the pruned list
//! back with [`ContextAction::CompactionFailed`] and decides what to do.

use crate::Message;
use crate::config::{ConfigError, ContextConfig};
use crate::context::budget::ContextBudget;
use crate::context::estimate::estimate_total_tokens;
use crate::context::eviction::{PruneReport, prune_tool_outputs};
use crate::context::planner::{CompactionPlan, plan_compaction};
use crate::context::summarizer::{
    CompactionResult, Summarize, SummarizeError, execute_compaction,
};
use crate::events::{ContextEvent, EventHandler, LoggingHandler};

/// Per-call knobs for [`ContextManager::manage_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ManageOptions {
    /// Skip the fast path and always attempt compaction.
    pub force: bool,
    /// Override the compaction target. Defaults to
    /// [`ContextConfig::compaction_target_tokens`].
    pub target_tokens: Option<usize>,
}

impl ManageOptions {
    pub fn forced() -> Self {
        Self {
            force: true,
            target_tokens: None,
        }
    }

    pub fn with_target_tokens(mut self, tokens: usize) -> Self {
        self.target_tokens = Some(tokens);
        self
    }
}

/// What a `manage` call did to the history.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextAction {
    /// Under budget; nothing was touched.
    Unchanged,
    /// Pruning alone brought the context back under the threshold.
    Pruned { report: PruneReport },
    /// A span was replaced by one summary message.
    Compacted {
        prune: PruneReport,
        plan: CompactionPlan,
        removed_tokens: usize,
        summary_tokens: usize,
    },
    /// Compaction ran but the planner found nothing to remove.
    CompactionSkipped { prune: PruneReport },
    /// The summarizer failed. The history reflects pruning only.
    CompactionFailed {
        prune: PruneReport,
        plan: CompactionPlan,
        error: SummarizeError,
    },
}

impl ContextAction {
    pub fn is_compaction_failure(&self) -> bool {
        matches!(self, ContextAction::CompactionFailed { .. })
    }

    /// Prune report, if pruning ran.
    pub fn prune_report(&self) -> Option<&PruneReport> {
        match self {
            ContextAction::Unchanged => None,
            ContextAction::Pruned { report } => Some(report),
            ContextAction::Compacted { prune, .. }
            | ContextAction::CompactionSkipped { prune }
            | ContextAction::CompactionFailed { prune, .. } => Some(prune),
        }
    }

    /// Whether the returned history differs from the input.
    pub fn modified_history(&self) -> bool {
        match self {
            ContextAction::Unchanged => false,
            ContextAction::Compacted { .. } => true,
            other => other.prune_report().is_some_and(|r| r.committed),
        }
    }

    /// Short label for logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            ContextAction::Unchanged => "unchanged",
            ContextAction::Pruned { .. } => "pruned",
            ContextAction::Compacted { .. } => "compacted",
            ContextAction::CompactionSkipped { .. } => "compaction-skipped",
            ContextAction::CompactionFailed { .. } => "compaction-failed",
        }
    }
}

/// Result of one [`ContextManager::manage`] call.
#[derive(Debug, Clone)]
pub struct ManageOutcome {
    /// The history to send next.
    pub messages: Vec<Message>,
    pub action: ContextAction,
    /// Estimated tokens of the input.
    pub tokens_before: usize,
    /// Estimated tokens of `messages`.
    pub tokens_after: usize,
}

/// Keeps a conversation under its model's context window.
///
/// # Example
///
/// ```
/// use contextwarden::config::ContextConfig;
/// use contextwarden::context::ContextManager;
/// use contextwarden::context::summarizer::UnavailableSummarizer;
/// use contextwarden::Message;
///
/// let manager = ContextManager::new(ContextConfig::default());
/// let messages = vec![Message::system("You are helpful."), Message::user("hi")];
/// let outcome = manager.manage(messages.clone(), "You are helpful.", &UnavailableSummarizer("offline".into()), false);
///
/// assert_eq!(outcome.messages, messages);
/// assert_eq!(outcome.action.label(), "unchanged");
/// ```
pub struct ContextManager {
    config: ContextConfig,
    budget: ContextBudget,
    handler: Box<dyn EventHandler>,
}

impl ContextManager {
    /// Manager with the default [`LoggingHandler`].
    pub fn new(config: ContextConfig) -> Self {
        let budget = ContextBudget::from_config(&config);
        Self {
            config,
            budget,
            handler: Box::new(LoggingHandler),
        }
    }

    /// Like [`new`](Self::new) but rejects inconsistent configs.
    pub fn try_new(config: ContextConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn with_event_handler(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        self.budget.needs_compaction(messages)
    }

    /// Bring `messages` under budget if needed.
    ///
    /// `force` skips the overflow check and always attempts compaction
    /// (pruning still runs first).
    pub fn manage(
        &self,
        messages: Vec<Message>,
        system_prompt: &str,
        summarizer: &dyn Summarize,
        force: bool,
    ) -> ManageOutcome {
        self.manage_with(
            messages,
            system_prompt,
            summarizer,
            ManageOptions {
                force,
                target_tokens: None,
            },
        )
    }

    pub fn manage_with(
        &self,
        mut messages: Vec<Message>,
        system_prompt: &str,
        summarizer: &dyn Summarize,
        options: ManageOptions,
    ) -> ManageOutcome {
        let tokens_before = estimate_total_tokens(&messages);
        let usage = self.budget.usage_for(tokens_before);
        self.handler.on_event(&ContextEvent::UsageMeasured {
            usage: &usage,
            force: options.force,
        });

        if !options.force && !usage.overflow {
            return ManageOutcome {
                messages,
                action: ContextAction::Unchanged,
                tokens_before,
                tokens_after: tokens_before,
            };
        }

        let prune = prune_tool_outputs(&mut messages, &self.config);
        if prune.committed {
            self.handler.on_event(&ContextEvent::PruneCommitted {
                evicted_count: prune.evicted_count(),
                recovered_tokens: prune.recoverable_tokens,
            });
        } else {
            self.handler.on_event(&ContextEvent::PruneSkipped {
                recoverable_tokens: prune.recoverable_tokens,
                minimum_tokens: self.config.prune_minimum,
            });
        }

        let tokens_pruned = estimate_total_tokens(&messages);
        if !options.force && !self.budget.is_overflow(tokens_pruned) {
            return ManageOutcome {
                messages,
                action: ContextAction::Pruned { report: prune },
                tokens_before,
                tokens_after: tokens_pruned,
            };
        }

        let target = options
            .target_tokens
            .unwrap_or_else(|| self.config.compaction_target_tokens());
        let plan = plan_compaction(&messages, target, &self.config);
        if !plan.is_noop() {
            self.handler.on_event(&ContextEvent::PreCompaction { plan });
        }

        let outcome = execute_compaction(summarizer, messages, plan, system_prompt);
        let tokens_after = estimate_total_tokens(&outcome.messages);

        let action = match outcome.result {
            CompactionResult::NotNeeded => {
                self.handler.on_event(&ContextEvent::CompactionSkipped {
                    tokens: tokens_after,
                    still_overflowing: self.budget.is_overflow(tokens_after),
                });
                ContextAction::CompactionSkipped { prune }
            }
            CompactionResult::Compacted {
                plan,
                removed_tokens,
                summary_tokens,
            } => {
                self.handler.on_event(&ContextEvent::Compacted {
                    removed_messages: plan.count,
                    tokens_before,
                    tokens_after,
                });
                ContextAction::Compacted {
                    prune,
                    plan,
                    removed_tokens,
                    summary_tokens,
                }
            }
            CompactionResult::Failed { plan, error } => {
                self.handler
                    .on_event(&ContextEvent::CompactionFailed { error: &error });
                ContextAction::CompactionFailed { prune, plan, error }
            }
        };

        ManageOutcome {
            messages: outcome.messages,
            action,
            tokens_before,
            tokens_after,
        }
    }
}
