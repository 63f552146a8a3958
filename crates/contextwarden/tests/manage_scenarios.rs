//! End-to-end behavior of the context pipeline: estimate, detect, prune,
//! plan, compact.

use contextwarden::config::ContextConfig;
use contextwarden::context::eviction::{PRUNE_MARKER, is_pruned, prune_tool_outputs};
use contextwarden::context::planner::{MIN_KEPT_MESSAGES, plan_compaction};
use contextwarden::context::summarizer::{
    CompactionResult, FnSummarizer, SUMMARY_PREFIX, SummarizeError, compact, is_summary_message,
};
use contextwarden::context::{
    ContextAction, ContextManager, estimate_message_tokens, estimate_tokens,
    estimate_total_tokens,
};
use contextwarden::events::NoopHandler;
use contextwarden::{Message, ToolCall};
use std::cell::Cell;

fn manager(config: ContextConfig) -> ContextManager {
    ContextManager::new(config).with_event_handler(NoopHandler)
}

/// system(500 chars), the task, one tool call and its output, then two user
/// turns.
fn tool_output_history(output_chars: usize) -> Vec<Message> {
    vec![
        Message::system("s".repeat(500)),
        Message::user("Refactor the parser."),
        Message::assistant_tool_calls(vec![ToolCall::function(
            "call_1",
            "read_file",
            r#"{"path":"src/parser.rs"}"#,
        )]),
        Message::tool_result("call_1", "x".repeat(output_chars)),
        Message::user("Now split it into modules."),
        Message::assistant_text("Working on it."),
        Message::user("Also add tests."),
    ]
}

/// Prefix plus `n` compactable messages of `tokens` estimated tokens each.
fn sized_history(n: usize, tokens: usize) -> Vec<Message> {
    let body = tokens - 4;
    let mut messages = vec![Message::system("sys"), Message::user("task")];
    for i in 0..n {
        let text = format!("{i:03}{}", "m".repeat(body * 4 - 3));
        if i % 2 == 0 {
            messages.push(Message::user(text));
        } else {
            messages.push(Message::assistant_text(text));
        }
    }
    messages
}

#[test]
fn estimate_is_quarter_length() {
    assert_eq!(estimate_tokens(""), 0);
    assert_eq!(estimate_tokens("abc"), 0);
    assert_eq!(estimate_tokens("abcd"), 1);
    let mut last = 0;
    for len in 0..64 {
        let tokens = estimate_tokens(&"a".repeat(len));
        assert_eq!(tokens, len / 4);
        assert!(tokens >= last);
        last = tokens;
    }
}

#[test]
fn large_stale_tool_output_is_pruned() {
    let mut messages = tool_output_history(160_000);
    let config = ContextConfig::default().with_prune_budgets(30_000, 5_000);

    let report = prune_tool_outputs(&mut messages, &config);

    assert!(report.committed);
    assert_eq!(report.evicted, vec![3]);
    assert_eq!(report.recoverable_tokens, 40_000);
    assert!(messages[3].content_is(PRUNE_MARKER));
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1"));
}

#[test]
fn manager_prunes_stale_tool_output() {
    let config = ContextConfig::default()
        .with_context_limit(40_000)
        .with_prune_budgets(30_000, 5_000);
    let summarizer = FnSummarizer::new(|_| panic!("pruning should be enough"));

    let outcome = manager(config).manage(tool_output_history(160_000), "sys", &summarizer, false);

    assert!(matches!(outcome.action, ContextAction::Pruned { .. }));
    assert!(is_pruned(&outcome.messages[3]));
    assert!(outcome.tokens_after < 1_000);
}

#[test]
fn small_tool_output_is_left_alone() {
    let mut messages = tool_output_history(16_000);
    let before = messages.clone();
    let config = ContextConfig::default().with_prune_budgets(30_000, 5_000);

    let report = prune_tool_outputs(&mut messages, &config);

    assert!(!report.committed);
    assert!(report.evicted.is_empty());
    assert_eq!(messages, before);
}

#[test]
fn plan_removes_oldest_span_that_fits_target() {
    let messages = sized_history(10, 1_000);
    let config = ContextConfig::default();
    let protected_tokens = estimate_total_tokens(&messages[..2]);
    // Room for 5_000 kept tokens: 5_000 must go.
    let target = protected_tokens + config.summary_token_estimate + 5_000;

    let plan = plan_compaction(&messages, target, &config);

    assert_eq!(plan.start, 2);
    let removed = estimate_total_tokens(&messages[plan.start..plan.end()]);
    assert!(removed >= 5_000);
    assert!(messages.len() - plan.end() >= MIN_KEPT_MESSAGES);
    // Oldest first: one fewer message would not have been enough.
    let one_less = estimate_total_tokens(&messages[plan.start..plan.end() - 1]);
    assert!(one_less < 5_000);
}

#[test]
fn summary_replaces_planned_span() {
    let messages = sized_history(10, 1_000);
    let config = ContextConfig::default();
    let target = estimate_total_tokens(&messages[..2]) + config.summary_token_estimate + 5_000;
    let plan = plan_compaction(&messages, target, &config);
    let summarizer = FnSummarizer::new(|request| {
        assert_eq!(request.span, &messages[plan.start..plan.end()]);
        Ok("SUMMARY".into())
    });

    let outcome = compact(&summarizer, messages.clone(), "sys", target, &config);

    let mut expected = messages[..plan.start].to_vec();
    expected.push(Message::user(format!("{SUMMARY_PREFIX}SUMMARY")));
    expected.extend_from_slice(&messages[plan.end()..]);
    assert_eq!(outcome.messages, expected);
    assert!(matches!(outcome.result, CompactionResult::Compacted { .. }));
}

#[test]
fn summarizer_failure_returns_pruned_list() {
    let mut messages = tool_output_history(160_000);
    // Enough chatter after the tool output that pruning alone can't fit 16k.
    for i in 0..8 {
        messages.insert(4, Message::assistant_text(format!("{i} {}", "n".repeat(8_000))));
    }
    let config = ContextConfig::default()
        .with_context_limit(16_000)
        .with_prune_budgets(30_000, 5_000);

    let mut pruned = messages.clone();
    assert!(prune_tool_outputs(&mut pruned, &config).committed);
    assert!(manager(config.clone()).needs_compaction(&pruned));

    let summarizer = FnSummarizer::new(|_| Err(SummarizeError::Transport("timed out".into())));
    let outcome = manager(config).manage(messages.clone(), "sys", &summarizer, false);

    assert!(outcome.action.is_compaction_failure());
    assert_eq!(outcome.messages, pruned);
    assert_ne!(outcome.messages, messages);
}

#[test]
fn under_threshold_skips_prune_and_summarize() {
    // 40k tokens of tool output against the default 200k window.
    let messages = tool_output_history(160_000);
    let calls = Cell::new(0);
    let summarizer = FnSummarizer::new(|_| {
        calls.set(calls.get() + 1);
        Ok("SUMMARY".into())
    });

    let outcome = manager(ContextConfig::default().with_prune_budgets(0, 0)).manage(
        messages.clone(),
        "sys",
        &summarizer,
        false,
    );

    assert_eq!(outcome.action, ContextAction::Unchanged);
    assert_eq!(outcome.messages, messages);
    assert_eq!(calls.get(), 0);
}

#[test]
fn summarizer_called_whenever_plan_is_non_empty() {
    let messages = sized_history(12, 1_000);
    let config = ContextConfig::default().with_context_limit(8_000);
    let target = config.compaction_target_tokens();
    let plan = plan_compaction(&messages, target, &config);
    assert!(!plan.is_noop());

    let calls = Cell::new(0);
    let summarizer = FnSummarizer::new(|request| {
        calls.set(calls.get() + 1);
        assert_eq!(request.span.len(), plan.count);
        Ok("SUMMARY".into())
    });
    let outcome = manager(config).manage(messages, "sys", &summarizer, false);

    assert_eq!(calls.get(), 1);
    assert_eq!(outcome.messages.iter().filter(|m| is_summary_message(m)).count(), 1);
}

#[test]
fn protected_prefix_survives_every_path() {
    let cases: Vec<(Vec<Message>, ContextConfig, bool)> = vec![
        (tool_output_history(160_000), ContextConfig::default(), false),
        (
            tool_output_history(160_000),
            ContextConfig::default().with_context_limit(40_000),
            false,
        ),
        (sized_history(20, 1_000), ContextConfig::default().with_context_limit(10_000), false),
        (sized_history(6, 500), ContextConfig::default(), true),
        (
            sized_history(20, 1_000),
            ContextConfig::default()
                .with_context_limit(10_000)
                .with_protected_messages(4),
            false,
        ),
    ];

    for (messages, config, force) in cases {
        let keep = config.protected_message_count;
        for summarizer_ok in [true, false] {
            let summarizer = FnSummarizer::new(move |_| {
                if summarizer_ok {
                    Ok("SUMMARY".into())
                } else {
                    Err(SummarizeError::Api("HTTP 500".into()))
                }
            });
            let outcome =
                manager(config.clone()).manage(messages.clone(), "sys", &summarizer, force);
            assert_eq!(outcome.messages[..keep], messages[..keep]);

            if let ContextAction::Compacted { plan, .. } = outcome.action {
                let compactable = messages.len() - keep;
                assert!(plan.count + MIN_KEPT_MESSAGES <= compactable);
                assert_eq!(
                    outcome.messages[outcome.messages.len() - MIN_KEPT_MESSAGES..],
                    messages[messages.len() - MIN_KEPT_MESSAGES..]
                );
            }
        }
    }
}

#[test]
fn repeated_management_is_stable() {
    let config = ContextConfig::default()
        .with_context_limit(40_000)
        .with_prune_budgets(30_000, 5_000);
    let manager = manager(config);
    let summarizer = FnSummarizer::new(|_| panic!("pruning should be enough"));

    let first = manager.manage(tool_output_history(160_000), "sys", &summarizer, false);
    let second = manager.manage(first.messages.clone(), "sys", &summarizer, false);

    assert_eq!(second.action, ContextAction::Unchanged);
    assert_eq!(second.messages, first.messages);
}

#[test]
fn unknown_fields_round_trip_through_pruning() {
    let json = serde_json::json!([
        {"role": "system", "content": "sys"},
        {"role": "user", "content": "task"},
        {"role": "assistant", "content": null, "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "grep", "arguments": "{}"}}
        ]},
        {"role": "tool", "tool_call_id": "c1", "name": "grep", "content": "g".repeat(160_000)},
        {"role": "user", "content": [
            {"type": "text", "text": "look", "cache_control": {"type": "ephemeral"}},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
        ]},
        {"role": "user", "content": "go on", "x_provider": 7}
    ]);
    let messages: Vec<Message> = serde_json::from_value(json).unwrap();
    let config = ContextConfig::default()
        .with_context_limit(40_000)
        .with_prune_budgets(30_000, 5_000);
    let summarizer = FnSummarizer::new(|_| panic!("pruning should be enough"));

    let outcome = manager(config).manage(messages, "sys", &summarizer, false);
    let out = serde_json::to_value(&outcome.messages).unwrap();

    assert_eq!(out[3]["name"], "grep");
    assert_eq!(out[3]["tool_call_id"], "c1");
    assert_eq!(out[3]["content"], PRUNE_MARKER);
    assert_eq!(out[4]["content"][0]["cache_control"]["type"], "ephemeral");
    assert_eq!(out[4]["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    assert_eq!(out[5]["x_provider"], 7);
    assert_eq!(out[2]["tool_calls"][0]["function"]["name"], "grep");
}

#[test]
fn malformed_messages_are_managed_not_rejected() {
    let json = serde_json::json!([
        {"role": "system", "content": "sys"},
        {"role": "developer", "content": "be brief"},
        {"role": "assistant", "content": null, "tool_calls": [
            {"id": "c1", "type": "function", "function": {"name": "grep", "arguments": {"q": "x"}}}
        ]},
        {"role": "tool", "tool_call_id": "c1", "content": "g".repeat(160_000)},
        {"role": "user", "content": {"unexpected": 1}},
        {"role": "user", "content": ["bare string", {"type": "text", "text": "look"}]},
        {"role": "user", "content": "go on"}
    ]);
    let messages: Vec<Message> = serde_json::from_value(json.clone()).unwrap();
    assert!(estimate_total_tokens(&messages) > 40_000);
    let config = ContextConfig::default()
        .with_context_limit(40_000)
        .with_prune_budgets(30_000, 5_000);
    let summarizer = FnSummarizer::new(|_| panic!("pruning should be enough"));

    let outcome = manager(config).manage(messages, "sys", &summarizer, false);
    let mut out = serde_json::to_value(&outcome.messages).unwrap();

    assert!(matches!(outcome.action, ContextAction::Pruned { .. }));
    assert_eq!(out[3]["content"], PRUNE_MARKER);
    // Everything except the evicted content comes back as it went in.
    out[3]["content"] = json[3]["content"].clone();
    assert_eq!(out, json);
}

#[test]
fn image_parts_carry_fixed_cost() {
    let msg: Message = serde_json::from_value(serde_json::json!({
        "role": "user",
        "content": [
            {"type": "text", "text": "abcdefgh"},
            {"type": "image_url", "image_url": {"url": "https://example.com/a.png"}}
        ]
    }))
    .unwrap();
    assert_eq!(estimate_message_tokens(&msg), 2 + 1_000 + 4);
}
