use std::future::ready;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tool_agent_model::{ErrorKind, ModelMessage, ToolCallRequest};
use tool_agent_test_model::{PresetEvent, PresetResponse, TestModelProvider};

use crate::conversation::Role;
use crate::tool::{Error as ToolError, Tool, ToolResult};
use crate::{
    AgentBuilder, AgentConfig, AgentError, HookOutcome, RetryPolicy, Stage,
    StatePatch, ToolErrorPolicy, TranscriptSource,
};

static EMPTY_SCHEMA: &Value = &Value::Null;

fn call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    }
}

#[derive(Deserialize)]
struct CityInput {
    city: String,
}

struct WeatherTool {
    schema: Value,
}

impl WeatherTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": { "city": { "type": "string" } },
                "required": ["city"]
            }),
        }
    }
}

impl Tool for WeatherTool {
    type Input = CityInput;

    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Returns the current weather of a city."
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        let weather = match input.city.as_str() {
            "Beijing" => "Sunny, 25°C".to_owned(),
            city => format!("No weather data for {city}"),
        };
        ready(Ok(weather))
    }
}

#[derive(Deserialize)]
struct SleepInput {
    millis: u64,
    label: String,
}

/// Answers with its label after sleeping.
struct SleepTool {
    schema: Value,
}

impl SleepTool {
    fn new() -> Self {
        Self {
            schema: json!({
                "type": "object",
                "properties": {
                    "millis": { "type": "integer" },
                    "label": { "type": "string" }
                },
                "required": ["millis", "label"]
            }),
        }
    }
}

impl Tool for SleepTool {
    type Input = SleepInput;

    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "Sleeps, then echoes the label."
    }

    fn parameter_schema(&self) -> &Value {
        &self.schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        async move {
            sleep(Duration::from_millis(input.millis)).await;
            Ok(input.label)
        }
    }
}

struct BrokenTool;

impl Tool for BrokenTool {
    type Input = Value;

    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails."
    }

    fn parameter_schema(&self) -> &Value {
        EMPTY_SCHEMA
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        ready(Err(ToolError::execution_error().with_reason("disk on fire")))
    }
}

fn tool_results(messages: &[ModelMessage]) -> Vec<(String, String)> {
    messages
        .iter()
        .filter_map(|msg| match msg {
            ModelMessage::Tool(result) => {
                Some((result.id.clone(), result.content.clone()))
            }
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_simple_message() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::MessageDelta("Hi, ".to_owned()),
        PresetEvent::MessageDelta("what can I do for you?".to_owned()),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_system_prompt("You are a helpful assistant.")
        .build();
    let completion = agent.invoke("Hello").await.unwrap();

    assert_eq!(completion.answer, "Hi, what can I do for you?");
    assert_eq!(completion.model_calls, 1);
    let roles: Vec<_> = completion
        .state
        .conversation()
        .items()
        .iter()
        .map(|item| item.role())
        .collect();
    assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_weather_tool_round_trip() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "get_current_weather",
        json!({ "city": "Beijing" }),
    )]));
    model_provider
        .add_assistant_turn(PresetResponse::text("It is sunny in Beijing."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(WeatherTool::new())
        .unwrap()
        .build();
    let completion = agent.invoke("What's the weather in Beijing?").await.unwrap();

    assert_eq!(completion.answer, "It is sunny in Beijing.");
    assert_eq!(completion.model_calls, 2);

    let conversation = completion.state.conversation();
    let roles: Vec<_> =
        conversation.items().iter().map(|item| item.role()).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    let steps = conversation.tool_steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].request.name, "get_current_weather");
    assert_eq!(steps[0].result, Some("Sunny, 25°C"));

    let requests = model_provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 1);
    assert_eq!(requests[0].tools[0].name, "get_current_weather");
    assert_eq!(
        tool_results(&requests[1].messages),
        [("call:1".to_owned(), "Sunny, 25°C".to_owned())]
    );
}

#[tokio::test]
async fn test_before_hook_counts_model_calls() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..9 {
        model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
            &format!("call:{idx}"),
            "get_current_weather",
            json!({ "city": "Beijing" }),
        )]));
    }
    model_provider.add_assistant_turn(PresetResponse::text("Still sunny."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(WeatherTool::new())
        .unwrap()
        .before_model(|state, _ctx| {
            let count = state
                .get("call_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            HookOutcome::Patch(StatePatch::new().set("call_count", count + 1))
        })
        .build();
    let completion = agent.invoke("Keep checking").await.unwrap();

    assert_eq!(completion.model_calls, 10);
    assert_eq!(completion.state.get("call_count"), Some(&json!(10)));
    assert_eq!(
        completion.state.conversation().last().unwrap().role(),
        Role::Assistant
    );
}

#[tokio::test]
async fn test_after_hook_sees_tool_calls() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "get_current_weather",
        json!({ "city": "Beijing" }),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Sunny."));

    let observed = Arc::new(Mutex::new(vec![]));
    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(WeatherTool::new())
        .unwrap()
        .after_model({
            let observed = Arc::clone(&observed);
            move |_state, ctx| {
                observed
                    .lock()
                    .unwrap()
                    .push((ctx.iteration(), ctx.has_tool_calls()));
                HookOutcome::NoChange
            }
        })
        .build();
    let completion = agent.invoke("Weather?").await.unwrap();

    assert_eq!(*observed.lock().unwrap(), [(1, Some(true)), (2, Some(false))]);
    let last_iteration = observed.lock().unwrap().last().map(|(i, _)| *i);
    assert_eq!(last_iteration, Some(completion.model_calls));
}

#[tokio::test]
async fn test_hook_patch_does_not_touch_conversation() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::text("The answer."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .after_model(|_state, _ctx| {
            HookOutcome::Patch(StatePatch::new().set("note", "hooked"))
        })
        .build();
    let completion = agent.invoke("Question").await.unwrap();

    let last = completion.state.conversation().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(last.transcript(), "The answer.");
    assert_eq!(completion.state.get("note"), Some(&json!("hooked")));
}

#[tokio::test]
async fn test_unknown_tool_fails() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "nonexistent_tool",
        json!({}),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Unreachable."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(WeatherTool::new())
        .unwrap()
        .build();
    let failure = agent.invoke("Call it").await.unwrap_err();

    assert_eq!(
        failure.error,
        AgentError::ToolNotFound {
            call_id: "call:1".to_owned(),
            name: "nonexistent_tool".to_owned(),
        }
    );
    assert_eq!(failure.error.classification(), "ToolNotFound");
    assert_eq!(failure.model_calls, 1);
    assert_eq!(model_provider.request_count(), 1);

    let steps = failure.state.conversation().tool_steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].request.name, "nonexistent_tool");
    assert_eq!(steps[0].result, None);
}

#[tokio::test]
async fn test_invalid_arguments_fail_after_batch() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([
        call("call:1", "get_current_weather", json!({ "town": "Beijing" })),
        call("call:2", "get_current_weather", json!({ "city": "Beijing" })),
    ]));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(WeatherTool::new())
        .unwrap()
        .build();
    let failure = agent.invoke("Weather?").await.unwrap_err();

    assert_eq!(
        failure.error,
        AgentError::ToolValidation {
            call_id: "call:1".to_owned(),
            name: "get_current_weather".to_owned(),
            reason: "missing required property `city`".to_owned(),
        }
    );
    let messages = failure.state.conversation().messages();
    assert_eq!(
        tool_results(&messages),
        [("call:2".to_owned(), "Sunny, 25°C".to_owned())]
    );
}

#[tokio::test]
async fn test_surface_policy_reports_tool_errors() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "nonexistent_tool",
        json!({}),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Sorry."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_config(AgentConfig {
            tool_error_policy: ToolErrorPolicy::Surface,
            ..Default::default()
        })
        .build();
    let completion = agent.invoke("Call it").await.unwrap();

    assert_eq!(completion.answer, "Sorry.");
    let steps = completion.state.conversation().tool_steps();
    assert_eq!(
        steps[0].result,
        Some("Error: Tool not found: no tool named `nonexistent_tool`")
    );
}

#[tokio::test]
async fn test_execution_error_is_surfaced() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "broken",
        json!({}),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("It broke."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(BrokenTool)
        .unwrap()
        .build();
    let completion = agent.invoke("Try it").await.unwrap();

    assert_eq!(completion.answer, "It broke.");
    let steps = completion.state.conversation().tool_steps();
    assert_eq!(steps[0].result, Some("Error: Execution error: disk on fire"));
}

#[tokio::test(start_paused = true)]
async fn test_tool_results_keep_request_order() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([
        call("call:slow", "sleep", json!({ "millis": 300, "label": "slow" })),
        call("call:fast", "sleep", json!({ "millis": 10, "label": "fast" })),
        call("call:mid", "sleep", json!({ "millis": 100, "label": "mid" })),
    ]));
    model_provider.add_assistant_turn(PresetResponse::text("All done."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(SleepTool::new())
        .unwrap()
        .build();
    let started_at = Instant::now();
    let completion = agent.invoke("Sleep").await.unwrap();

    // The calls overlap, a sequential run would take at least 410ms.
    assert!(started_at.elapsed() < Duration::from_millis(400));
    let messages = completion.state.conversation().messages();
    assert_eq!(
        tool_results(&messages),
        [
            ("call:slow".to_owned(), "slow".to_owned()),
            ("call:fast".to_owned(), "fast".to_owned()),
            ("call:mid".to_owned(), "mid".to_owned()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_tool_timeout_is_surfaced() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "sleep",
        json!({ "millis": 10_000, "label": "late" }),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Too slow."));

    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(SleepTool::new())
        .unwrap()
        .with_config(AgentConfig {
            tool_timeout: Some(Duration::from_secs(1)),
            ..Default::default()
        })
        .build();
    let completion = agent.invoke("Sleep").await.unwrap();

    let steps = completion.state.conversation().tool_steps();
    assert!(steps[0].result.unwrap().starts_with("Error: Timed out"));
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(
        PresetResponse::text("Unreachable.")
            .with_failures(0)
            .with_failure_kind(ErrorKind::Auth),
    );

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_config(AgentConfig {
            retry: RetryPolicy {
                max_retries: 5,
                ..Default::default()
            },
            ..Default::default()
        })
        .build();
    let failure = agent.invoke("Hello").await.unwrap_err();

    assert!(matches!(failure.error, AgentError::Auth(_)));
    assert_eq!(failure.error.classification(), "AuthError");
    assert_eq!(model_provider.request_count(), 1);
    assert_eq!(failure.state.conversation().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_are_retried() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_assistant_turn(PresetResponse::text("Made it.").with_failures(2));

    let agent = AgentBuilder::with_model_provider(model_provider.clone()).build();
    let completion = agent.invoke("Hello").await.unwrap();

    assert_eq!(completion.answer, "Made it.");
    assert_eq!(completion.model_calls, 1);
    assert_eq!(model_provider.request_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_retries_exhausted() {
    let mut model_provider = TestModelProvider::default();
    model_provider
        .add_assistant_turn(PresetResponse::text("Unreachable.").with_failures(0));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_config(AgentConfig {
            retry: RetryPolicy {
                max_retries: 2,
                ..Default::default()
            },
            ..Default::default()
        })
        .build();
    let failure = agent.invoke("Hello").await.unwrap_err();

    assert!(matches!(
        failure.error,
        AgentError::Transport { attempts: 3, .. }
    ));
    assert_eq!(failure.error.classification(), "TransportError");
    assert_eq!(model_provider.request_count(), 3);
}

#[tokio::test]
async fn test_max_iterations() {
    let mut model_provider = TestModelProvider::default();
    for idx in 0..3 {
        model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
            &format!("call:{idx}"),
            "get_current_weather",
            json!({ "city": "Beijing" }),
        )]));
    }

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(WeatherTool::new())
        .unwrap()
        .with_config(AgentConfig {
            max_iterations: 2,
            ..Default::default()
        })
        .build();
    let failure = agent.invoke("Loop").await.unwrap_err();

    assert_eq!(failure.error, AgentError::MaxIterationsExceeded(2));
    assert_eq!(failure.model_calls, 2);
    assert_eq!(model_provider.request_count(), 2);
    assert_eq!(failure.state.conversation().tool_steps().len(), 2);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::text("Unreachable."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone()).build();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let failure = agent
        .invoke_with_cancellation("Hello", cancel)
        .await
        .unwrap_err();

    assert_eq!(failure.error, AgentError::Cancelled);
    assert_eq!(failure.model_calls, 0);
    assert_eq!(model_provider.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_while_running_tools() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "sleep",
        json!({ "millis": 60_000, "label": "never" }),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Unreachable."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(SleepTool::new())
        .unwrap()
        .build();
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        }
    });
    let failure = agent
        .invoke_with_cancellation("Sleep", cancel)
        .await
        .unwrap_err();

    assert_eq!(failure.error, AgentError::Cancelled);
    assert_eq!(model_provider.request_count(), 1);
    let steps = failure.state.conversation().tool_steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].result, None);
}

#[tokio::test]
async fn test_callbacks() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::with_events([
        PresetEvent::MessageDelta("Checking.".to_owned()),
        PresetEvent::ToolCall(call(
            "call:1",
            "get_current_weather",
            json!({ "city": "Beijing" }),
        )),
    ]));
    model_provider.add_assistant_turn(PresetResponse::text("Sunny."));

    let stages = Arc::new(Mutex::new(vec![]));
    let transcripts = Arc::new(Mutex::new(vec![]));
    let agent = AgentBuilder::with_model_provider(model_provider)
        .with_tool(WeatherTool::new())
        .unwrap()
        .on_stage({
            let stages = Arc::clone(&stages);
            move |stage| stages.lock().unwrap().push(stage)
        })
        .on_transcript({
            let transcripts = Arc::clone(&transcripts);
            move |text, source| {
                transcripts.lock().unwrap().push((text.to_owned(), source));
            }
        })
        .build();
    agent.invoke("Weather?").await.unwrap();

    assert_eq!(
        *stages.lock().unwrap(),
        [
            Stage::AwaitingModel,
            Stage::AwaitingTools,
            Stage::AwaitingModel,
            Stage::Done
        ]
    );
    assert!(Stage::Done.is_terminal());
    assert_eq!(
        *transcripts.lock().unwrap(),
        [
            ("Weather?".to_owned(), TranscriptSource::User),
            ("Checking.".to_owned(), TranscriptSource::Assistant),
            ("Sunny, 25°C".to_owned(), TranscriptSource::Tool),
            ("Sunny.".to_owned(), TranscriptSource::Assistant),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_invocations() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call:1",
        "get_current_weather",
        json!({ "city": "Beijing" }),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text("Sunny."));

    let agent = AgentBuilder::with_model_provider(model_provider.clone())
        .with_tool(WeatherTool::new())
        .unwrap()
        .before_model(|state, _ctx| {
            let count = state
                .get("call_count")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            HookOutcome::Patch(StatePatch::new().set("call_count", count + 1))
        })
        .build();
    let (first, second) =
        tokio::join!(agent.invoke("Weather?"), agent.invoke("Weather again?"));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.answer, "Sunny.");
    assert_eq!(second.answer, "Sunny.");
    // Each invocation owns its state.
    assert_eq!(first.state.get("call_count"), Some(&json!(2)));
    assert_eq!(second.state.get("call_count"), Some(&json!(2)));
    assert_eq!(model_provider.request_count(), 4);
}
