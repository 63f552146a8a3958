//! One agent's message history and its context bookkeeping.
//!
//! [`Conversation`] owns the list the agent loop appends to. Each iteration
//! calls [`Conversation::manage`] before building the next request; the list
//! is moved into the manager and the returned list moved back, so there is
//! never a half-spliced history visible to the caller.
//!
//! Conversations share nothing. Hosts running several agents keep one
//! `Conversation` per agent and may share a single [`ContextManager`].

use crate::config::ContextConfig;
use crate::context::estimate::{estimate_content_tokens, estimate_total_tokens};
use crate::context::eviction::is_pruned;
use crate::context::manager::{ContextAction, ContextManager, ManageOptions};
use crate::context::summarizer::{Summarize, is_summary_message};
use crate::{Message, MessageRole};

/// Ordered message history for a single agent.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    prune_count: usize,
    compaction_count: usize,
    failed_compactions: usize,
}

impl Conversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Start a conversation from a system prompt and the original task.
    pub fn with_task(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        Self::new(vec![Message::system(system_prompt), Message::user(task)])
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn push_messages(&mut self, msgs: impl IntoIterator<Item = Message>) {
        self.messages.extend(msgs);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Number of `manage` calls that committed a prune.
    pub fn prune_count(&self) -> usize {
        self.prune_count
    }

    /// Number of successful compactions.
    pub fn compaction_count(&self) -> usize {
        self.compaction_count
    }

    /// Number of compactions whose summarizer call failed.
    pub fn failed_compactions(&self) -> usize {
        self.failed_compactions
    }

    pub fn estimate_tokens(&self) -> usize {
        estimate_total_tokens(&self.messages)
    }

    /// Run one management pass over the owned history.
    pub fn manage(
        &mut self,
        manager: &ContextManager,
        system_prompt: &str,
        summarizer: &dyn Summarize,
        force: bool,
    ) -> ContextAction {
        self.manage_with(
            manager,
            system_prompt,
            summarizer,
            ManageOptions {
                force,
                target_tokens: None,
            },
        )
    }

    pub fn manage_with(
        &mut self,
        manager: &ContextManager,
        system_prompt: &str,
        summarizer: &dyn Summarize,
        options: ManageOptions,
    ) -> ContextAction {
        let messages = std::mem::take(&mut self.messages);
        let outcome = manager.manage_with(messages, system_prompt, summarizer, options);
        self.messages = outcome.messages;

        if outcome.action.prune_report().is_some_and(|r| r.committed) {
            self.prune_count += 1;
        }
        match &outcome.action {
            ContextAction::Compacted { .. } => self.compaction_count += 1,
            ContextAction::CompactionFailed { .. } => self.failed_compactions += 1,
            _ => {}
        }
        outcome.action
    }

    /// Per-region breakdown of estimated token usage.
    pub fn breakdown(&self, config: &ContextConfig) -> ContextBreakdown {
        let split = config.protected_message_count.min(self.messages.len());
        let (protected, compactable) = self.messages.split_at(split);

        let tool_output_tokens = compactable
            .iter()
            .filter(|m| m.is_role(MessageRole::Tool) && !is_pruned(m))
            .map(|m| estimate_content_tokens(m.content.as_ref()))
            .sum();

        let protected_tokens = estimate_total_tokens(protected);
        let compactable_tokens = estimate_total_tokens(compactable);

        ContextBreakdown {
            protected_tokens,
            compactable_tokens,
            tool_output_tokens,
            evicted_count: compactable.iter().filter(|m| is_pruned(m)).count(),
            summary_count: compactable.iter().filter(|m| is_summary_message(m)).count(),
            total_tokens: protected_tokens + compactable_tokens,
        }
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self::new(messages)
    }
}

/// Per-region breakdown of estimated context token usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBreakdown {
    /// Estimated tokens in the protected prefix.
    pub protected_tokens: usize,
    /// Estimated tokens after the prefix.
    pub compactable_tokens: usize,
    /// Content tokens of tool outputs that have not been pruned.
    pub tool_output_tokens: usize,
    /// Tool outputs already replaced by the sentinel.
    pub evicted_count: usize,
    /// Synthetic summary messages in the history.
    pub summary_count: usize,
    pub total_tokens: usize,
}
