use serde_json::json;
use tool_agent::core::conversation::Role;
use tool_agent::hooks::{
    CALL_COUNT_KEY, after_model_report, before_model_report,
};
use tool_agent::trace::{render_completion, render_failure};
use tool_agent::SessionBuilder;
use tool_agent_model::ToolCallRequest;
use tool_agent_test_model::{PresetResponse, TestModelProvider};

fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_owned(),
        name: name.to_owned(),
        arguments,
    }
}

#[tokio::test]
async fn test_weather_question() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call_weather",
        "get_current_weather",
        json!({ "city": "北京" }),
    )]));
    model_provider.add_assistant_turn(PresetResponse::text(
        "北京今天晴，不需要带伞。",
    ));

    let session = SessionBuilder::with_model_provider(model_provider.clone())
        .with_system_prompt("You are a helpful assistant.")
        .build()
        .unwrap();
    let completion = session.ask("北京天气怎么样？").await.unwrap();

    assert_eq!(completion.answer, "北京今天晴，不需要带伞。");
    let requests = model_provider.requests();
    let tool_names: Vec<_> =
        requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(tool_names, ["get_current_weather"]);

    let report = render_completion(&completion);
    assert!(report.starts_with("[Final answer]\n北京今天晴，不需要带伞。\n"));
    assert!(report.contains("Step 1:\n  tool: get_current_weather\n"));
    assert!(report.contains("  arguments: {\"city\":\"北京\"}\n"));
    assert!(report.contains("  result: 北京当前天气：晴，-4℃，空气质量良。\n"));
    assert!(report.contains("  system: You are a helpful assistant.\n"));
    assert!(report.contains("  ai: 北京今天晴，不需要带伞。\n"));
}

#[tokio::test]
async fn test_direct_answer() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::text("你好！"));

    let session = SessionBuilder::with_model_provider(model_provider)
        .build()
        .unwrap();
    let completion = session.ask("你好").await.unwrap();

    let report = render_completion(&completion);
    assert!(report.contains("[Tool call trace]\n  (no tools used)\n"));
    assert_eq!(
        after_model_report(&completion.state),
        [
            "=== Middleware: after_model ===",
            "[LOG] model answered directly (no tool calls)",
        ]
    );
}

#[tokio::test]
async fn test_hooked_session_runs_independent_invocations() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([
        call("call_weather", "get_current_weather", json!({ "city": "Beijing" })),
        call("call_add", "add_numbers", json!({ "a": 12.5, "b": 7.3 })),
    ]));
    model_provider.add_assistant_turn(PresetResponse::text("晴，19.8。"));

    let session = SessionBuilder::with_model_provider(model_provider.clone())
        .with_add_numbers()
        .with_logging_hooks()
        .build()
        .unwrap();

    for input in ["第一个问题", "第二个问题"] {
        let completion = session.ask(input).await.unwrap();
        assert_eq!(completion.model_calls, 2);
        // The counter restarts with every invocation.
        assert_eq!(completion.state.get(CALL_COUNT_KEY), Some(&json!(2)));

        let steps = completion.state.conversation().tool_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].result, Some("19.8"));

        let lines = before_model_report(&completion.state, 3);
        assert_eq!(lines[1], "[LOG] call count: 3");
        assert_eq!(lines[2], "[LOG] message count: 5");
        assert_eq!(lines[3], "[LOG] last message (type=ai): 晴，19.8。");
    }
    assert_eq!(model_provider.request_count(), 4);
}

#[tokio::test]
async fn test_failure_report() {
    let mut model_provider = TestModelProvider::default();
    model_provider.add_assistant_turn(PresetResponse::tool_calls([call(
        "call_1",
        "nonexistent_tool",
        json!({}),
    )]));

    let session = SessionBuilder::with_model_provider(model_provider)
        .build()
        .unwrap();
    let failure = session.ask("Call something").await.unwrap_err();

    let last = failure.state.conversation().last().unwrap();
    assert_eq!(last.role(), Role::Assistant);
    assert_eq!(
        after_model_report(&failure.state)[1],
        "[LOG] model decided to call tools: [\"nonexistent_tool\"]"
    );

    let report = render_failure(&failure);
    assert!(report.starts_with("[Failed] ToolNotFound: "));
    assert!(report.contains("  tool: nonexistent_tool\n"));
    assert!(report.contains("  result: (none)\n"));
}
