//! Run one context-management pass over a conversation file.
//!
//! Reads a JSON array of chat messages, prunes and/or compacts it if it is
//! over budget, and writes the resulting array as JSON. Logs and the summary
//! line go to stderr so stdout stays machine-readable.
//!
//! Summaries are produced through OpenRouter with the key from the
//! `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Manage a transcript against a 128k window, write the result to a file
//! contextwarden --conversation run.json --config context.json --output run.compact.json
//!
//! # Only prune; never call a model
//! contextwarden --conversation run.json --offline
//!
//! # Compact regardless of usage, with a specific summary model
//! cat run.json | contextwarden --conversation - --force --model anthropic/claude-sonnet-4
//! ```

use clap::Parser;
use contextwarden::api::client::{API_KEY_ENV, DEFAULT_MODEL};
use contextwarden::api::{OpenRouterClient, OpenRouterSummarizer};
use contextwarden::config::ContextConfig;
use contextwarden::context::summarizer::UnavailableSummarizer;
use contextwarden::context::{ContextAction, ContextManager, ManageOptions, ManageOutcome};
use contextwarden::{Message, MessageRole, Summarize};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Keep an agent conversation inside its model's context window.
#[derive(Parser)]
#[command(name = "contextwarden", version)]
struct Cli {
    /// JSON file holding the message array (`-` reads stdin)
    #[arg(long)]
    conversation: String,

    /// JSON file with context configuration overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override `model_context_limit` from the config
    #[arg(long)]
    context_limit: Option<usize>,

    /// Agent system prompt passed to the summarizer (defaults to the first
    /// system message)
    #[arg(long)]
    system_prompt: Option<String>,

    /// Compact even when usage is under the threshold
    #[arg(long)]
    force: bool,

    /// Override the compaction target in tokens
    #[arg(long)]
    target_tokens: Option<usize>,

    /// Never call a model; only pruning can take effect
    #[arg(long)]
    offline: bool,

    /// Model used to write summaries
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,

    /// Write the result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("contextwarden=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<ContextConfig, String> {
    let mut config = match &cli.config {
        Some(path) => ContextConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => ContextConfig::default(),
    };
    if let Some(limit) = cli.context_limit {
        config = config.with_context_limit(limit);
    }
    Ok(config)
}

fn read_conversation(source: &str) -> Result<Vec<Message>, String> {
    let text = if source == "-" {
        io::read_to_string(io::stdin()).map_err(|e| format!("failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(source)
            .map_err(|e| format!("failed to read conversation '{source}': {e}"))?
    };
    serde_json::from_str(&text).map_err(|e| format!("failed to parse conversation '{source}': {e}"))
}

fn default_system_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .find(|m| m.is_role(MessageRole::System))
        .and_then(Message::text)
        .unwrap_or_default()
}

/// Pick the summarizer: OpenRouter when a key is present, else one that
/// always fails so only pruning applies.
fn build_summarizer(cli: &Cli, cancel: CancellationToken) -> Box<dyn Summarize + Send> {
    if cli.offline {
        return Box::new(UnavailableSummarizer("offline mode".into()));
    }
    match OpenRouterClient::from_env() {
        Ok(client) => Box::new(
            OpenRouterSummarizer::new(Arc::new(client), tokio::runtime::Handle::current())
                .with_model(&cli.model)
                .with_cancel_token(cancel),
        ),
        Err(e) => {
            warn!("{e}; compaction disabled (set {API_KEY_ENV} or pass --offline)");
            Box::new(UnavailableSummarizer(e))
        }
    }
}

fn write_output(path: Option<&PathBuf>, messages: &[Message]) -> Result<(), String> {
    let json = serde_json::to_string_pretty(messages)
        .map_err(|e| format!("failed to serialize conversation: {e}"))?;
    match path {
        Some(path) => std::fs::write(path, json + "\n")
            .map_err(|e| format!("failed to write '{}': {e}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{json}").map_err(|e| format!("failed to write stdout: {e}"))
        }
    }
}

fn report(outcome: &ManageOutcome, manager_usable: usize, messages_in: usize) {
    let pct = |tokens: usize| {
        if manager_usable == 0 {
            100.0
        } else {
            tokens as f64 / manager_usable as f64 * 100.0
        }
    };
    eprintln!(
        "  [{}] {} message(s) -> {}, ~{} -> ~{} tokens ({:.1}% -> {:.1}% of {})",
        outcome.action.label(),
        messages_in,
        outcome.messages.len(),
        outcome.tokens_before,
        outcome.tokens_after,
        pct(outcome.tokens_before),
        pct(outcome.tokens_after),
        manager_usable,
    );
    match &outcome.action {
        ContextAction::Pruned { report } => {
            eprintln!("  pruned {} tool output(s)", report.evicted_count());
        }
        ContextAction::Compacted {
            prune,
            plan,
            removed_tokens,
            summary_tokens,
        } => {
            if prune.committed {
                eprintln!("  pruned {} tool output(s)", prune.evicted_count());
            }
            eprintln!(
                "  summarized {} message(s) (~{removed_tokens} tokens) into ~{summary_tokens} tokens",
                plan.count
            );
        }
        ContextAction::CompactionFailed { error, .. } => {
            eprintln!("  compaction failed: {error}");
        }
        ContextAction::Unchanged | ContextAction::CompactionSkipped { .. } => {}
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(&cli)?;
    let manager = ContextManager::try_new(config).map_err(|e| e.to_string())?;
    let usable = manager.budget().usable_tokens();

    let messages = read_conversation(&cli.conversation)?;
    let messages_in = messages.len();
    let system_prompt = cli
        .system_prompt
        .clone()
        .unwrap_or_else(|| default_system_prompt(&messages));

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; abandoning summarization");
                cancel.cancel();
            }
        });
    }

    let summarizer = build_summarizer(&cli, cancel);
    let options = ManageOptions {
        force: cli.force,
        target_tokens: cli.target_tokens,
    };

    // The OpenRouter summarizer blocks on the runtime, so run off the executor.
    let outcome = tokio::task::spawn_blocking(move || {
        manager.manage_with(messages, &system_prompt, summarizer.as_ref(), options)
    })
    .await
    .map_err(|e| format!("context management task failed: {e}"))?;

    write_output(cli.output.as_ref(), &outcome.messages)?;
    report(&outcome, usable, messages_in);
    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
