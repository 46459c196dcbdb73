//! Runs two questions through an agent with logging hooks and the weather
//! and add tools, printing every hook report and the trace of each answer.
//!
//! Each question is an independent invocation, so the call count reported
//! by the hooks starts over at 1 for every question instead of running on
//! across both.

use std::process::ExitCode;

use owo_colors::OwoColorize;
use tokio::signal;
use tool_agent::core::CancellationToken;
use tool_agent::trace::{render_completion, render_failure};
use tool_agent::{SessionBuilder, Settings};

const USER_INPUTS: [&str; 2] = [
    "帮我查一下北京的天气，然后再算一下 12.5 加 7.3。",
    "上海的天气怎么样？另外帮我算 100 减 37.5。",
];

const RULE: &str = "==================================================";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let session = SessionBuilder::with_model_provider(settings.model_provider())
        .with_config(settings.agent.clone())
        .with_system_prompt(include_str!("../prompts/hooked.md").trim())
        .with_add_numbers()
        .with_logging_hooks();
    let session = match session.build() {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    println!("{RULE}\nAgent with logging hooks\n{RULE}");

    let mut exit_code = ExitCode::SUCCESS;
    for input in USER_INPUTS {
        println!("\n{RULE}");
        println!("{} {input}", "[User input]".bright_cyan());
        println!("{RULE}");

        match session.ask_with_cancellation(input, cancel.clone()).await {
            Ok(completion) => println!("\n{}", render_completion(&completion)),
            Err(failure) => {
                eprintln!("\n{}", render_failure(&failure).bright_red());
                exit_code = ExitCode::FAILURE;
                if cancel.is_cancelled() {
                    break;
                }
            }
        }
    }
    exit_code
}
