//! Configuration for context management.
//!
//! [`ContextConfig`] is the one authoritative source of every limit and
//! threshold. It is built once per [`ContextManager`](crate::context::ContextManager)
//! and passed by reference to each component; no module keeps its own copy of
//! these numbers.
//!
//! # Examples
//!
//! Defaults:
//!
//! ```
//! use contextwarden::config::ContextConfig;
//!
//! let config = ContextConfig::default();
//! assert_eq!(config.usable_context(), 200_000);
//! ```
//!
//! Builder methods for common settings:
//!
//! ```
//! use contextwarden::config::ContextConfig;
//!
//! let config = ContextConfig::default()
//!     .with_context_limit(128_000)
//!     .with_prune_budgets(20_000, 4_000)
//!     .with_auto_compact_threshold(0.8);
//! assert!(config.validate().is_ok());
//! ```
//!
//! Partial JSON over defaults:
//!
//! ```
//! use contextwarden::config::ContextConfig;
//!
//! let config = ContextConfig::from_json_str(r#"{"model_context_limit": 64000}"#).unwrap();
//! assert_eq!(config.model_context_limit, 64_000);
//! assert_eq!(config.prune_protect, 30_000);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default context window size in tokens.
pub const DEFAULT_CONTEXT_LIMIT: usize = 200_000;

/// Errors raised while loading or validating a [`ContextConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Limits and thresholds for estimation, pruning, and compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Model context window in tokens.
    pub model_context_limit: usize,
    /// Tokens reserved for model output (the per-response max_tokens).
    pub output_token_max: usize,
    /// Subtract `output_token_max` from the usable window. Off by default.
    pub reserve_output_tokens: bool,
    /// Fraction of the usable window above which the context overflows.
    pub auto_compact_threshold: f64,
    /// Fraction of the usable window compaction aims for.
    pub compact_target_fraction: f64,
    /// Tool-output tokens (counted from the newest) that are never evicted.
    pub prune_protect: usize,
    /// Eviction is committed only if strictly more tokens than this are recoverable.
    pub prune_minimum: usize,
    /// Leading messages (system prompt included) exempt from all reduction.
    pub protected_message_count: usize,
    /// Most recent user turns whose tool output pruning never touches.
    pub protect_last_turns: usize,
    /// Planner's estimate of the summary message cost.
    pub summary_token_estimate: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            model_context_limit: DEFAULT_CONTEXT_LIMIT,
            output_token_max: 16_384,
            reserve_output_tokens: false,
            auto_compact_threshold: 0.85,
            compact_target_fraction: 0.75,
            prune_protect: 30_000,
            prune_minimum: 5_000,
            protected_message_count: 2,
            protect_last_turns: 2,
            summary_token_estimate: 2_000,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a (possibly partial) JSON document. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Set the model context window (in tokens).
    pub fn with_context_limit(mut self, tokens: usize) -> Self {
        self.model_context_limit = tokens;
        self
    }

    /// Reserve `tokens` of the window for model output.
    pub fn with_output_reserve(mut self, tokens: usize) -> Self {
        self.output_token_max = tokens;
        self.reserve_output_tokens = true;
        self
    }

    pub fn with_auto_compact_threshold(mut self, fraction: f64) -> Self {
        self.auto_compact_threshold = fraction;
        self
    }

    pub fn with_compact_target_fraction(mut self, fraction: f64) -> Self {
        self.compact_target_fraction = fraction;
        self
    }

    /// Set the pruning protect budget and the minimum recovery to commit.
    pub fn with_prune_budgets(mut self, protect: usize, minimum: usize) -> Self {
        self.prune_protect = protect;
        self.prune_minimum = minimum;
        self
    }

    pub fn with_protected_messages(mut self, count: usize) -> Self {
        self.protected_message_count = count;
        self
    }

    pub fn with_protect_last_turns(mut self, turns: usize) -> Self {
        self.protect_last_turns = turns;
        self
    }

    pub fn with_summary_token_estimate(mut self, tokens: usize) -> Self {
        self.summary_token_estimate = tokens;
        self
    }

    /// Usable window: the full limit, or the limit minus the output reserve
    /// when `reserve_output_tokens` is set.
    pub fn usable_context(&self) -> usize {
        if self.reserve_output_tokens {
            self.model_context_limit.saturating_sub(self.output_token_max)
        } else {
            self.model_context_limit
        }
    }

    /// Token count above which the context overflows.
    pub fn overflow_threshold_tokens(&self) -> f64 {
        self.usable_context() as f64 * self.auto_compact_threshold
    }

    /// Default compaction target in tokens.
    pub fn compaction_target_tokens(&self) -> usize {
        (self.usable_context() as f64 * self.compact_target_fraction) as usize
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_context_limit == 0 {
            return Err(ConfigError::Invalid(
                "model_context_limit must be greater than zero".into(),
            ));
        }
        if self.usable_context() == 0 {
            return Err(ConfigError::Invalid(format!(
                "output reserve ({}) leaves no usable context out of {}",
                self.output_token_max, self.model_context_limit
            )));
        }
        for (name, value) in [
            ("auto_compact_threshold", self.auto_compact_threshold),
            ("compact_target_fraction", self.compact_target_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.compact_target_fraction > self.auto_compact_threshold {
            return Err(ConfigError::Invalid(format!(
                "compact_target_fraction ({}) must not exceed auto_compact_threshold ({})",
                self.compact_target_fraction, self.auto_compact_threshold
            )));
        }
        Ok(())
    }
}
