use std::path::PathBuf;
use std::sync::Arc;

use agent_loop_core::LoopErr;
use agent_loop_core::exec::ExecAction;
use agent_loop_core::models::FunctionCallOutputPayload;
use agent_loop_core::models::ResponseInputItem;
use agent_loop_core::models::ResponseItem;
use agent_loop_core::protocol::ApprovalPolicy;
use agent_loop_core::protocol::EventMsg;
use agent_loop_core::protocol::LastResponseIdEvent;
use agent_loop_core::protocol::LoadingEvent;
use agent_loop_core::protocol::TurnCompleteEvent;
use assert_matches::assert_matches;
use core_test_support::drain_events;
use core_test_support::loading_flags;
use core_test_support::responses::assistant_message;
use core_test_support::responses::completed;
use core_test_support::responses::function_call;
use core_test_support::responses::shell_call;
use core_test_support::scripted::ExecBehavior;
use core_test_support::scripted::RecordingExecutor;
use core_test_support::scripted::ScriptedGate;
use core_test_support::scripted::ScriptedResponse;
use core_test_support::scripted::test_session;
use pretty_assertions::assert_eq;
use serde_json::json;

fn hello() -> Vec<ResponseInputItem> {
    vec![ResponseInputItem::user_text("hello")]
}

fn function_output(item: &ResponseItem) -> (&str, &FunctionCallOutputPayload) {
    match item {
        ResponseItem::FunctionCallOutput { call_id, output } => (call_id, output),
        other => panic!("expected a function call output, got {other:?}"),
    }
}

fn last_response_ids(events: &[EventMsg]) -> Vec<String> {
    events
        .iter()
        .filter_map(|msg| match msg {
            EventMsg::LastResponseId(ev) => Some(ev.response_id.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn turn_without_tool_calls_completes_after_one_request() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Events(vec![
            assistant_message("Hi there"),
            completed("resp_1"),
        ])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    let events = drain_events(&mut t.events);
    assert_eq!(events.len(), 6, "unexpected events: {events:?}");
    assert_eq!(events[0], EventMsg::TurnStarted);
    assert_eq!(events[1], EventMsg::Loading(LoadingEvent { loading: true }));
    assert_matches!(&events[2], EventMsg::ResponseItem(ev) if ev.item.assistant_text().as_deref() == Some("Hi there"));
    assert_eq!(events[3], EventMsg::Loading(LoadingEvent { loading: false }));
    assert_eq!(
        events[4],
        EventMsg::LastResponseId(LastResponseIdEvent {
            response_id: "resp_1".to_string()
        })
    );
    assert_eq!(
        events[5],
        EventMsg::TurnComplete(TurnCompleteEvent {
            last_agent_message: Some("Hi there".to_string())
        })
    );

    let prompts = t.channel.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].model, "test-model");
    assert_eq!(prompts[0].instructions.as_deref(), Some("You are a test."));
    assert_eq!(prompts[0].previous_response_id, None);
    assert_eq!(
        prompts[0].input,
        vec![ResponseItem::from(ResponseInputItem::user_text("hello"))]
    );
    assert_eq!(t.session.last_response_id().as_deref(), Some("resp_1"));
    assert!(t.executor.actions().is_empty());
}

#[tokio::test]
async fn shell_call_output_is_sent_back_to_the_model() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![shell_call("call_1", &["ls"]), completed("resp_1")]),
            ScriptedResponse::Events(vec![
                assistant_message("There is one file."),
                completed("resp_2"),
            ]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding("a.txt\n"),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    assert_eq!(
        t.executor.actions(),
        vec![ExecAction::Command {
            command: vec!["ls".to_string()],
            cwd: PathBuf::from("/workspace"),
            timeout_ms: None,
        }]
    );

    let prompts = t.channel.prompts();
    assert_eq!(prompts.len(), 2);
    // Every request of a turn continues from the same response.
    assert_eq!(prompts[1].previous_response_id, None);
    let second = &prompts[1].input;
    assert_eq!(second.len(), 3);
    assert_matches!(&second[1], ResponseItem::FunctionCall { call_id, .. } if call_id == "call_1");
    let (call_id, output) = function_output(&second[2]);
    assert_eq!(call_id, "call_1");
    assert_eq!(output.success, Some(true));
    let parsed: serde_json::Value = serde_json::from_str(&output.content).expect("json output");
    assert_eq!(parsed["output"], "a.txt\n");
    assert_eq!(parsed["metadata"]["exit_code"], 0);

    let events = drain_events(&mut t.events);
    assert_eq!(loading_flags(&events), vec![true, false, true, false]);
    assert_eq!(last_response_ids(&events), vec!["resp_2".to_string()]);
    assert!(events.iter().any(|msg| matches!(
        msg,
        EventMsg::ResponseItem(ev) if matches!(ev.item, ResponseItem::FunctionCallOutput { .. })
    )));
    assert_eq!(
        events.last(),
        Some(&EventMsg::TurnComplete(TurnCompleteEvent {
            last_agent_message: Some("There is one file.".to_string())
        }))
    );
    assert_eq!(t.session.last_response_id().as_deref(), Some("resp_2"));
}

#[tokio::test]
async fn multiple_calls_run_in_order_before_the_next_request() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![
                shell_call("call_a", &["pwd"]),
                shell_call("call_b", &["ls", "-a"]),
                completed("resp_1"),
            ]),
            ScriptedResponse::Events(vec![assistant_message("ok"), completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding("x"),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    let commands: Vec<Vec<String>> = t
        .executor
        .actions()
        .into_iter()
        .map(|action| match action {
            ExecAction::Command { command, .. } => command,
            other => panic!("unexpected action {other:?}"),
        })
        .collect();
    assert_eq!(
        commands,
        vec![
            vec!["pwd".to_string()],
            vec!["ls".to_string(), "-a".to_string()]
        ]
    );

    let prompts = t.channel.prompts();
    let second = &prompts[1].input;
    assert_eq!(second.len(), 5);
    assert_eq!(function_output(&second[3]).0, "call_a");
    assert_eq!(function_output(&second[4]).0, "call_b");
}

#[tokio::test]
async fn workdir_is_resolved_against_session_cwd() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![
                function_call(
                    "call_1",
                    "shell",
                    json!({"command": ["ls"], "workdir": "src", "timeout_ms": 500}),
                ),
                completed("resp_1"),
            ]),
            ScriptedResponse::Events(vec![completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    assert_eq!(
        t.executor.actions(),
        vec![ExecAction::Command {
            command: vec!["ls".to_string()],
            cwd: PathBuf::from("/workspace/src"),
            timeout_ms: Some(500),
        }]
    );
}

#[tokio::test]
async fn unknown_function_is_reported_to_the_model() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![
                function_call("call_1", "web_search", json!({"query": "rust"})),
                completed("resp_1"),
            ]),
            ScriptedResponse::Events(vec![assistant_message("sorry"), completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    assert!(t.executor.actions().is_empty());
    let prompts = t.channel.prompts();
    let (call_id, output) = function_output(&prompts[1].input[2]);
    assert_eq!(call_id, "call_1");
    assert_eq!(output.content, "unsupported call: web_search");
    assert_eq!(output.success, Some(false));
}

#[tokio::test]
async fn malformed_arguments_are_reported_to_the_model() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![
                function_call("call_1", "shell", json!({"cmd": "ls"})),
                completed("resp_1"),
            ]),
            ScriptedResponse::Events(vec![completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    let prompts = t.channel.prompts();
    let (_, output) = function_output(&prompts[1].input[2]);
    assert!(
        output.content.starts_with("failed to parse function arguments"),
        "unexpected output: {}",
        output.content
    );
}

#[tokio::test]
async fn failing_command_is_recorded_as_unsuccessful() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![shell_call("call_1", &["false"]), completed("resp_1")]),
            ScriptedResponse::Events(vec![completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::new(ExecBehavior::Output {
            stdout: String::new(),
            exit_code: 1,
        }),
    );

    t.session.run(hello(), None).await.expect("turn succeeds");

    let prompts = t.channel.prompts();
    let (_, output) = function_output(&prompts[1].input[2]);
    assert_eq!(output.success, Some(false));
    assert!(output.content.contains("\"exit_code\":1"));
}

#[tokio::test]
async fn fatal_executor_error_fails_the_turn() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Events(vec![
            shell_call("call_1", &["ls"]),
            completed("resp_1"),
        ])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::new(ExecBehavior::Fatal("sandbox unavailable".to_string())),
    );

    let err = t.session.run(hello(), None).await.expect_err("turn fails");
    assert_matches!(err, LoopErr::Fatal(ref message) if message == "sandbox unavailable");

    let events = drain_events(&mut t.events);
    assert_matches!(events.last(), Some(EventMsg::Error(ev)) if ev.message.contains("sandbox unavailable"));
    assert!(last_response_ids(&events).is_empty());
    assert_eq!(t.session.last_response_id(), None);
}

#[tokio::test]
async fn transport_failure_rejects_run_and_closes_loading() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Fail("connection reset".to_string()),
            ScriptedResponse::Events(vec![completed("resp_1")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let err = t.session.run(hello(), None).await.expect_err("turn fails");
    assert_matches!(err, LoopErr::Stream(_));

    let events = drain_events(&mut t.events);
    assert_eq!(
        events,
        vec![
            EventMsg::TurnStarted,
            EventMsg::Loading(LoadingEvent { loading: true }),
            EventMsg::Loading(LoadingEvent { loading: false }),
            EventMsg::Error(agent_loop_core::protocol::ErrorEvent {
                message: "stream disconnected before completion: connection reset".to_string()
            }),
        ]
    );

    // The session is idle again and accepts the next turn.
    t.session.run(hello(), None).await.expect("retry succeeds");
    assert_eq!(t.session.last_response_id().as_deref(), Some("resp_1"));
}

#[tokio::test]
async fn stream_closed_without_completion_is_an_error() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Events(vec![assistant_message("partial")])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let err = t.session.run(hello(), None).await.expect_err("turn fails");
    assert_matches!(err, LoopErr::Stream(ref message) if message.contains("response.completed"));
}

#[tokio::test]
async fn previous_response_id_advances_only_on_completed_turns() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![completed("resp_1")]),
            ScriptedResponse::Fail("boom".to_string()),
            ScriptedResponse::Events(vec![completed("resp_2")]),
            ScriptedResponse::Events(vec![completed("resp_3")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("first turn");
    assert!(t.session.run(hello(), None).await.is_err());
    t.session.run(hello(), None).await.expect("third turn");
    t.session
        .run(hello(), Some("resp_external".to_string()))
        .await
        .expect("fourth turn");

    let previous: Vec<Option<String>> = t
        .channel
        .prompts()
        .into_iter()
        .map(|prompt| prompt.previous_response_id)
        .collect();
    assert_eq!(
        previous,
        vec![
            None,
            Some("resp_1".to_string()),
            Some("resp_1".to_string()),
            Some("resp_external".to_string()),
        ]
    );
    assert_eq!(t.session.last_response_id().as_deref(), Some("resp_3"));
}

#[tokio::test]
async fn events_carry_the_turn_id() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![completed("resp_1")]),
            ScriptedResponse::Events(vec![completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.run(hello(), None).await.expect("first turn");
    t.session.run(hello(), None).await.expect("second turn");

    let mut ids = Vec::new();
    while let Ok(event) = t.events.try_recv() {
        if !ids.contains(&event.id) {
            ids.push(event.id);
        }
    }
    assert_eq!(ids, vec!["1".to_string(), "2".to_string()]);
}
