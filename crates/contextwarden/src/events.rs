//! Events emitted by the [`ContextManager`](crate::context::ContextManager).
//!
//! The manager decides automatically but always tells you what it decided.
//! Implement [`EventHandler`] to forward decisions to metrics, a UI, or your
//! own logs.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`LoggingHandler`] | Structured logging via `tracing` (the default) |
//! | [`NoopHandler`] | Silence |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | Custom `impl EventHandler` | Full control |

use crate::context::budget::ContextUsage;
use crate::context::planner::CompactionPlan;
use crate::context::summarizer::SummarizeError;
use tracing::{debug, info, warn};

/// Something the manager measured or did.
#[derive(Debug)]
pub enum ContextEvent<'a> {
    /// Usage measured at the start of a `manage` call.
    UsageMeasured { usage: &'a ContextUsage, force: bool },
    /// Tool outputs were replaced with the sentinel.
    PruneCommitted {
        evicted_count: usize,
        recovered_tokens: usize,
    },
    /// The prune scan found too little to be worth evicting.
    PruneSkipped {
        recoverable_tokens: usize,
        minimum_tokens: usize,
    },
    /// The summarizer is about to be called for this span.
    PreCompaction { plan: CompactionPlan },
    /// A span was replaced by one summary message.
    Compacted {
        removed_messages: usize,
        tokens_before: usize,
        tokens_after: usize,
    },
    /// Compaction ran but the planner found nothing to remove.
    CompactionSkipped { tokens: usize, still_overflowing: bool },
    /// The summarizer failed; the pruned history was kept.
    CompactionFailed { error: &'a SummarizeError },
}

/// Handler for context management events.
///
/// The default implementation ignores every event.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: &ContextEvent<'_>) {
        let _ = event;
    }
}

/// An event handler that ignores everything.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
///
/// # Example
///
/// ```
/// use contextwarden::events::{ContextEvent, EventHandler, FnEventHandler};
///
/// let handler = FnEventHandler::new(|event| {
///     if let ContextEvent::CompactionFailed { error } = event {
///         eprintln!("compaction failed: {error}");
///     }
/// });
/// handler.on_event(&ContextEvent::CompactionSkipped {
///     tokens: 0,
///     still_overflowing: false,
/// });
/// ```
pub struct FnEventHandler<F>(F)
where
    F: Fn(&ContextEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&ContextEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &ContextEvent<'_>) {
        (self.0)(event)
    }
}

/// Renders every event through `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &ContextEvent<'_>) {
        match event {
            ContextEvent::UsageMeasured { usage, force } => {
                if *force {
                    info!("{} (forced compaction)", usage.to_log_string());
                } else {
                    debug!("{}", usage.to_log_string());
                }
            }
            ContextEvent::PruneCommitted {
                evicted_count,
                recovered_tokens,
            } => {
                info!("Pruned {evicted_count} tool output(s), recovered ~{recovered_tokens} tokens");
            }
            ContextEvent::PruneSkipped {
                recoverable_tokens,
                minimum_tokens,
            } => {
                debug!(
                    "Prune skipped: {recoverable_tokens} tokens recoverable (min: {minimum_tokens})"
                );
            }
            ContextEvent::PreCompaction { plan } => {
                debug!(
                    "Summarizing {} message(s) starting at index {}",
                    plan.count, plan.start
                );
            }
            ContextEvent::Compacted {
                removed_messages,
                tokens_before,
                tokens_after,
            } => {
                info!(
                    "Context compaction replaced {removed_messages} message(s): \
                     {tokens_before} -> {tokens_after} tokens"
                );
            }
            ContextEvent::CompactionSkipped {
                tokens,
                still_overflowing,
            } => {
                if *still_overflowing {
                    warn!("Context still over budget at {tokens} tokens; nothing safely compactable");
                } else {
                    debug!("Compaction not needed at {tokens} tokens");
                }
            }
            ContextEvent::CompactionFailed { error } => {
                warn!("Context compaction failed, continuing with oversized context: {error}");
            }
        }
    }
}

/// Run `f` under a scoped subscriber and return what it logged at `level`
/// or above, one line per event.
#[cfg(test)]
pub(crate) fn capture_logs(level: tracing::Level, f: impl FnOnce()) -> String {
    use std::sync::{Arc, Mutex};

    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buf = Arc::new(Mutex::new(Vec::new()));
    let writer = {
        let buf = Arc::clone(&buf);
        move || Capture(Arc::clone(&buf))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_writer(writer)
        .with_max_level(level)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buf.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn fn_handler_receives_events() {
        let seen = Mutex::new(Vec::new());
        let handler = FnEventHandler::new(|event| {
            if let ContextEvent::PruneCommitted { evicted_count, .. } = event {
                seen.lock().unwrap().push(*evicted_count);
            }
        });
        handler.on_event(&ContextEvent::PruneCommitted {
            evicted_count: 3,
            recovered_tokens: 9_000,
        });
        handler.on_event(&ContextEvent::CompactionSkipped {
            tokens: 1,
            still_overflowing: true,
        });
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }

    #[test]
    fn logging_handler_renders_every_event() {
        let usage = ContextUsage {
            estimated_tokens: 10,
            usable_tokens: 100,
            usage_pct: 0.1,
            overflow: false,
        };
        let error = SummarizeError::Cancelled;
        let events = [
            ContextEvent::UsageMeasured {
                usage: &usage,
                force: true,
            },
            ContextEvent::PruneCommitted {
                evicted_count: 2,
                recovered_tokens: 7_000,
            },
            ContextEvent::PruneSkipped {
                recoverable_tokens: 1,
                minimum_tokens: 2,
            },
            ContextEvent::PreCompaction {
                plan: CompactionPlan { start: 2, count: 3 },
            },
            ContextEvent::Compacted {
                removed_messages: 3,
                tokens_before: 100,
                tokens_after: 50,
            },
            ContextEvent::CompactionSkipped {
                tokens: 10,
                still_overflowing: false,
            },
            ContextEvent::CompactionSkipped {
                tokens: 900,
                still_overflowing: true,
            },
            ContextEvent::CompactionFailed { error: &error },
        ];

        let logs = capture_logs(tracing::Level::DEBUG, || {
            for event in &events {
                LoggingHandler.on_event(event);
            }
        });
        let lines: Vec<&str> = logs.lines().collect();

        assert_eq!(lines.len(), events.len());
        assert!(lines[0].contains("INFO") && lines[0].contains("(forced compaction)"));
        assert!(lines[1].contains("INFO") && lines[1].contains("Pruned 2 tool output(s)"));
        assert!(lines[2].contains("DEBUG") && lines[2].contains("Prune skipped"));
        assert!(lines[3].contains("DEBUG") && lines[3].contains("starting at index 2"));
        assert!(lines[4].contains("INFO") && lines[4].contains("100 -> 50 tokens"));
        assert!(lines[5].contains("DEBUG") && lines[5].contains("not needed at 10 tokens"));
        assert!(lines[6].contains("WARN") && lines[6].contains("900 tokens"));
        assert!(lines[7].contains("WARN") && lines[7].contains("summarization cancelled"));
    }

    #[test]
    fn noop_handler_logs_nothing() {
        let logs = capture_logs(tracing::Level::TRACE, || {
            NoopHandler.on_event(&ContextEvent::CompactionFailed {
                error: &SummarizeError::EmptyResponse,
            });
        });
        assert!(logs.is_empty());
    }
}
