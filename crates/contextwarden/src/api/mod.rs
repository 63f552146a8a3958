//! OpenRouter-backed summarization.
//!
//! The core only needs something implementing
//! [`Summarize`](crate::context::summarizer::Summarize). This module provides
//! one that calls the OpenRouter chat completions API:
//!
//! - [`client`]: [`OpenRouterClient`] (async HTTP) and
//!   [`OpenRouterSummarizer`], which adapts it to the blocking trait.
//! - [`retry`]: exponential backoff with jitter for 429/5xx and network
//!   failures. Never retries 400/401.

pub mod client;
pub mod retry;

pub use client::{OpenRouterClient, OpenRouterSummarizer};
pub use retry::RetryConfig;
