//! Human-readable reports of finished invocations.

use std::fmt::Write as _;

use tool_agent_core::{AgentState, Completion, Failure};

use crate::hooks::role_name;

const RESULT_PREVIEW_LEN: usize = 80;
const HISTORY_PREVIEW_LEN: usize = 100;

/// Shortens `text` to at most `max_chars` characters, marking the cut with
/// `...`.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_owned(),
    }
}

/// Renders the tool calls of the invocation, each with its arguments and
/// result.
pub fn render_tool_steps(state: &AgentState) -> String {
    let steps = state.conversation().tool_steps();
    let mut out = String::new();
    if steps.is_empty() {
        out.push_str("  (no tools used)\n");
        return out;
    }
    for (idx, step) in steps.iter().enumerate() {
        let _ = writeln!(out, "\nStep {}:", idx + 1);
        let _ = writeln!(out, "  tool: {}", step.request.name);
        let _ = writeln!(out, "  arguments: {}", step.request.arguments);
        match step.result {
            Some(result) => {
                let _ = writeln!(
                    out,
                    "  result: {}",
                    truncate(result, RESULT_PREVIEW_LEN)
                );
            }
            None => out.push_str("  result: (none)\n"),
        }
    }
    out
}

/// Renders every message of the conversation, one per line.
pub fn render_history(state: &AgentState) -> String {
    let mut out = String::new();
    for item in state.conversation().items() {
        let _ = writeln!(
            out,
            "  {}: {}",
            role_name(item.role()),
            truncate(item.transcript(), HISTORY_PREVIEW_LEN)
        );
    }
    out
}

/// Renders the final answer followed by the tool trace and the history.
pub fn render_completion(completion: &Completion) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Final answer]\n{}", completion.answer);
    let _ = write!(
        out,
        "\n[Tool call trace]\n{}",
        render_tool_steps(&completion.state)
    );
    let _ = write!(
        out,
        "\n[Message history]\n{}",
        render_history(&completion.state)
    );
    out
}

/// Renders the failure classification followed by the partial trace.
pub fn render_failure(failure: &Failure) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[Failed] {}: {}",
        failure.error.classification(),
        failure.error
    );
    let _ = write!(
        out,
        "\n[Tool call trace]\n{}",
        render_tool_steps(&failure.state)
    );
    let _ = write!(
        out,
        "\n[Message history]\n{}",
        render_history(&failure.state)
    );
    out
}
