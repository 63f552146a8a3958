//! OpenRouter chat-completions client and the summarizer built on it.

use crate::api::retry::{RetryConfig, classify_error};
use crate::context::summarizer::{Summarize, SummarizeError, SummaryRequest};
use crate::{Message, MessageContent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Model used for summaries unless overridden.
pub const DEFAULT_MODEL: &str = "z-ai/glm-5";

/// Completion budget for one summary.
pub const SUMMARY_MAX_TOKENS: u32 = 4096;

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENROUTER_KEY";

// ── Request / response types ───────────────────────────────────────

/// Chat completion request body. Only the fields summarization needs.
#[derive(Serialize, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "is_zero_f32")]
    pub temperature: f32,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

fn is_zero_f32(v: &f32) -> bool {
    *v == 0.0
}

#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<MessageContent>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`OpenRouterClient::chat`].
#[derive(Debug, Default)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Turn a raw HTTP response into a completion or an error string.
fn parse_completion(status: reqwest::StatusCode, text: &str) -> Result<ChatCompletion, String> {
    if !status.is_success() {
        return Err(format!("OpenRouter API HTTP {status}: {text}"));
    }

    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("OpenRouter API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    let choice = parsed.choices.and_then(|c| c.into_iter().next());
    Ok(match choice {
        Some(c) => ChatCompletion {
            content: c.message.content.as_ref().map(MessageContent::to_text),
            usage: parsed.usage,
            finish_reason: c.finish_reason,
        },
        None => ChatCompletion {
            usage: parsed.usage,
            ..ChatCompletion::default()
        },
    })
}

// ── Client ─────────────────────────────────────────────────────────

/// Async HTTP client for the OpenRouter chat completions API.
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    url: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a client with the default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(
            api_key,
            "https://github.com/tacryt-socryp/contextwarden",
            "contextwarden",
        )
    }

    /// Create a client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("contextwarden/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            url: OPENROUTER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Read the key from `OPENROUTER_KEY`.
    pub fn from_env() -> Result<Self, String> {
        let key = std::env::var(API_KEY_ENV).map_err(|_| format!("{API_KEY_ENV} not set"))?;
        if key.trim().is_empty() {
            return Err(format!("{API_KEY_ENV} is empty"));
        }
        Self::new(key)
    }

    /// Point the client at a different OpenAI-compatible endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, max_tokens={}",
            body.model,
            body.messages.len(),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );
        parse_completion(status, &text)
    }
}

// ── Summarizer ─────────────────────────────────────────────────────

/// Build the chat messages for one summarization call.
pub fn summary_chat_messages(request: &SummaryRequest<'_>) -> Vec<Message> {
    let mut user = String::new();
    if !request.system_prompt.is_empty() {
        user.push_str("The agent was working under this system prompt:\n\n");
        user.push_str(request.system_prompt);
        user.push_str("\n\n---\n\n");
    }
    user.push_str("Conversation to summarize:\n\n");
    user.push_str(&request.transcript());
    vec![Message::system(request.instruction), Message::user(user)]
}

/// [`Summarize`] over OpenRouter.
///
/// `summarize` blocks the calling thread on `handle`. Call it from a plain
/// thread or `tokio::task::spawn_blocking`, never from inside an async task.
pub struct OpenRouterSummarizer {
    client: Arc<OpenRouterClient>,
    handle: tokio::runtime::Handle,
    model: String,
    max_tokens: u32,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl OpenRouterSummarizer {
    pub fn new(client: Arc<OpenRouterClient>, handle: tokio::runtime::Handle) -> Self {
        Self {
            client,
            handle,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: SUMMARY_MAX_TOKENS,
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Abort as soon as `token` is cancelled, including mid-request and
    /// mid-backoff.
    ///
    /// An abort surfaces as [`SummarizeError::Cancelled`], which the manager
    /// treats like any other failed compaction.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Async body of [`Summarize::summarize`], with retries.
    pub async fn summarize_async(
        &self,
        request: &SummaryRequest<'_>,
    ) -> Result<String, SummarizeError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: summary_chat_messages(request),
            max_tokens: self.max_tokens,
            temperature: 0.3,
        };

        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SummarizeError::Cancelled),
                result = self.client.chat(&body) => result,
            };

            let error = match result {
                Ok(completion) => match completion.content {
                    Some(text) if !text.trim().is_empty() => return Ok(text),
                    _ => SummarizeError::EmptyResponse,
                },
                Err(e) => classify_error(e),
            };

            if !self.retry.should_retry(attempt, &error) {
                return Err(error);
            }
            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                "Summarization failed (attempt {}/{}): {error}. Retrying in {delay:?}...",
                attempt + 1,
                self.retry.max_attempts,
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SummarizeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

impl Summarize for OpenRouterSummarizer {
    fn summarize(&self, request: &SummaryRequest<'_>) -> Result<String, SummarizeError> {
        self.handle.block_on(self.summarize_async(request))
    }
}
