//! Hooks that log what the agent is about to do and what the model decided.
//!
//! Both hooks print to stdout so the output reads along with the rest of
//! the program output. The report lines are built by plain functions, which
//! makes them easy to check without capturing stdout.

use tool_agent_core::conversation::Role;
use tool_agent_core::{AgentState, HookContext, HookOutcome, StatePatch};

use crate::trace::truncate;

/// The state field [`log_before_model`] keeps the model call count in.
pub const CALL_COUNT_KEY: &str = "call_count";

const PREVIEW_LEN: usize = 80;

/// Prints the call count, the message count and a preview of the newest
/// message, and records the call count in the state.
pub fn log_before_model(state: &AgentState, _ctx: &HookContext) -> HookOutcome {
    let call_count = next_call_count(state);
    for line in before_model_report(state, call_count) {
        println!("{line}");
    }
    HookOutcome::Patch(StatePatch::new().set(CALL_COUNT_KEY, call_count))
}

/// Prints which tools the model chose, or that it answered directly.
pub fn log_after_model(state: &AgentState, _ctx: &HookContext) -> HookOutcome {
    for line in after_model_report(state) {
        println!("{line}");
    }
    HookOutcome::NoChange
}

/// Returns the call count including the model call about to be made.
pub fn next_call_count(state: &AgentState) -> u64 {
    let count = state
        .get(CALL_COUNT_KEY)
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    count + 1
}

/// Builds the lines printed by [`log_before_model`].
pub fn before_model_report(state: &AgentState, call_count: u64) -> Vec<String> {
    let conversation = state.conversation();
    let mut lines = vec![
        "=== Middleware: before_model ===".to_owned(),
        format!("[LOG] call count: {call_count}"),
        format!("[LOG] message count: {}", conversation.len()),
    ];
    match conversation.last() {
        Some(last) => lines.push(format!(
            "[LOG] last message (type={}): {}",
            role_name(last.role()),
            truncate(last.transcript(), PREVIEW_LEN)
        )),
        None => lines.push("[LOG] no messages yet.".to_owned()),
    }
    lines
}

/// Builds the lines printed by [`log_after_model`].
pub fn after_model_report(state: &AgentState) -> Vec<String> {
    let mut lines = vec!["=== Middleware: after_model ===".to_owned()];
    let Some(last) = state.conversation().last() else {
        lines.push("[LOG] no messages yet.".to_owned());
        return lines;
    };
    let tool_names: Vec<_> =
        last.tool_calls().iter().map(|call| call.name.as_str()).collect();
    if tool_names.is_empty() {
        lines.push("[LOG] model answered directly (no tool calls)".to_owned());
    } else {
        lines.push(format!("[LOG] model decided to call tools: {tool_names:?}"));
    }
    lines
}

/// Returns the short role label used in logs and traces.
pub fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "human",
        Role::Assistant => "ai",
        Role::Tool => "tool",
    }
}
