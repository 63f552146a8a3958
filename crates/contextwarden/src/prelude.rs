//! Convenience re-exports for common `contextwarden` types.
//!
//! Meant to be glob-imported by agent loops:
//!
//! ```ignore
//! use contextwarden::prelude::*;
//! ```
//!
//! Pulls in the message types, the config, the manager and its outcome types,
//! the summarizer trait with its closure adapter, and the event handlers.
//! Lower-level pieces (planner, prune scan, token estimates) stay in their
//! modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    CallArguments, ContentItem, ContentPart, Message, MessageContent, MessageRole, ToolCall,
};

// ── Configuration ───────────────────────────────────────────────────
pub use crate::config::{ConfigError, ContextConfig};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::summarizer::{
    FnSummarizer, Summarize, SummarizeError, SummaryRequest, UnavailableSummarizer,
};
pub use crate::context::{
    ContextAction, ContextBreakdown, ContextBudget, ContextManager, ContextUsage, Conversation,
    ManageOptions, ManageOutcome,
};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{ContextEvent, EventHandler, FnEventHandler, LoggingHandler, NoopHandler};

// ── Summarization backend ───────────────────────────────────────────
pub use crate::api::{OpenRouterClient, OpenRouterSummarizer, RetryConfig};
