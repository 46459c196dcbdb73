//! Asks the agent about the weather once and prints the answer with the
//! tool call trace.

use std::process::ExitCode;

use owo_colors::OwoColorize;
use tokio::signal;
use tool_agent::core::CancellationToken;
use tool_agent::trace::{render_completion, render_failure};
use tool_agent::{SessionBuilder, Settings};

const USER_INPUT: &str = "帮我查一下北京的天气，然后再用一句话建议我要不要带伞。";

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
        .with_system_prompt(include_str!("../prompts/simple.md").trim());
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

    println!("{} {USER_INPUT}", "[User input]".bright_cyan());
    match session.ask_with_cancellation(USER_INPUT, cancel).await {
        Ok(completion) => {
            println!("{}", render_completion(&completion));
            ExitCode::SUCCESS
        }
        Err(failure) => {
            eprintln!("{}", render_failure(&failure).bright_red());
            ExitCode::FAILURE
        }
    }
}
