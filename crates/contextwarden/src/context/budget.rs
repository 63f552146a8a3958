//! Overflow detection: compares estimated usage against a fraction of the
//! usable context window.
//!
//! The usable window comes from [`ContextConfig::usable_context`]; the output
//! reserve is subtracted only when the config asks for it.

use crate::Message;
use crate::config::ContextConfig;
use crate::context::estimate::estimate_total_tokens;

/// Overflow detector for one configuration.
///
/// # Example
///
/// ```
/// use contextwarden::config::ContextConfig;
/// use contextwarden::context::ContextBudget;
/// use contextwarden::Message;
///
/// let config = ContextConfig::default().with_context_limit(1_000);
/// let budget = ContextBudget::from_config(&config);
///
/// assert!(!budget.is_overflow(850));
/// assert!(budget.is_overflow(851));
///
/// let messages = vec![Message::user("x".repeat(4_000))];
/// assert!(budget.needs_compaction(&messages));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    /// Usable context window in tokens.
    usable_tokens: usize,
    /// Fraction of the usable window above which the context overflows.
    threshold: f64,
}

impl ContextBudget {
    pub fn new(usable_tokens: usize, threshold: f64) -> Self {
        Self {
            usable_tokens,
            threshold,
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.usable_context(), config.auto_compact_threshold)
    }

    /// Usable context window in tokens.
    pub fn usable_tokens(&self) -> usize {
        self.usable_tokens
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `total > usable * threshold`.
    pub fn is_overflow(&self, total_tokens: usize) -> bool {
        total_tokens as f64 > self.usable_tokens as f64 * self.threshold
    }

    pub fn needs_compaction(&self, messages: &[Message]) -> bool {
        self.is_overflow(estimate_total_tokens(messages))
    }

    /// Snapshot of the current usage.
    pub fn estimate_usage(&self, messages: &[Message]) -> ContextUsage {
        self.usage_for(estimate_total_tokens(messages))
    }

    /// Usage snapshot for an already computed token total.
    pub fn usage_for(&self, estimated_tokens: usize) -> ContextUsage {
        let usage_pct = if self.usable_tokens > 0 {
            estimated_tokens as f64 / self.usable_tokens as f64
        } else {
            1.0
        };
        ContextUsage {
            estimated_tokens,
            usable_tokens: self.usable_tokens,
            usage_pct,
            overflow: self.is_overflow(estimated_tokens),
        }
    }
}

/// Snapshot of context usage at a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContextUsage {
    /// Estimated tokens consumed.
    pub estimated_tokens: usize,
    /// Usable context window.
    pub usable_tokens: usize,
    /// Usage as a fraction (0.0 to 1.0+).
    pub usage_pct: f64,
    /// Whether usage is over the overflow threshold.
    pub overflow: bool,
}

impl ContextUsage {
    /// Format as a short log-friendly string.
    pub fn to_log_string(&self) -> String {
        format!(
            "context: ~{} tokens ({:.1}% of {}){}",
            self.estimated_tokens,
            self.usage_pct * 100.0,
            self.usable_tokens,
            if self.overflow { " [overflow]" } else { "" },
        )
    }
}
