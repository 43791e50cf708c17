use std::sync::Arc;
use std::time::Duration;

use agent_loop_core::LoopErr;
use agent_loop_core::confirmation::ChannelConfirmationGate;
use agent_loop_core::models::ResponseInputItem;
use agent_loop_core::models::ResponseItem;
use agent_loop_core::protocol::ApprovalPolicy;
use agent_loop_core::protocol::CommandConfirmation;
use agent_loop_core::protocol::EventMsg;
use agent_loop_core::protocol::LoadingEvent;
use agent_loop_core::protocol::TurnAbortReason;
use agent_loop_core::protocol::TurnAbortedEvent;
use assert_matches::assert_matches;
use core_test_support::collect_turn;
use core_test_support::drain_events;
use core_test_support::responses::assistant_message;
use core_test_support::responses::completed;
use core_test_support::responses::shell_call;
use core_test_support::scripted::ExecBehavior;
use core_test_support::scripted::RecordingExecutor;
use core_test_support::scripted::ScriptedGate;
use core_test_support::scripted::ScriptedResponse;
use core_test_support::scripted::test_session;
use core_test_support::wait_for_event;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

fn hello() -> Vec<ResponseInputItem> {
    vec![ResponseInputItem::user_text("hello")]
}

fn interrupted() -> EventMsg {
    EventMsg::TurnAborted(TurnAbortedEvent {
        reason: TurnAbortReason::Interrupted,
    })
}

#[tokio::test]
async fn cancel_while_streaming_aborts_the_turn() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Hang(vec![])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    wait_for_event(&mut t.events, |msg| {
        matches!(msg, EventMsg::Loading(LoadingEvent { loading: true }))
    })
    .await;

    t.session.cancel().expect("cancel succeeds");
    timeout(Duration::from_secs(5), run)
        .await
        .expect("run resolves after cancel")
        .expect("task joins")
        .expect("cancelled turn resolves ok");

    assert_eq!(
        collect_turn(&mut t.events).await,
        vec![
            EventMsg::Loading(LoadingEvent { loading: false }),
            interrupted()
        ]
    );
    assert_eq!(t.session.last_response_id(), None);
}

#[tokio::test]
async fn no_items_are_emitted_after_cancel_and_next_turn_starts_fresh() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Hang(vec![assistant_message("partial")]),
            ScriptedResponse::Events(vec![assistant_message("again"), completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    wait_for_event(&mut t.events, |msg| matches!(msg, EventMsg::ResponseItem(_))).await;

    t.session.cancel().expect("cancel succeeds");
    run.await.expect("task joins").expect("turn resolves ok");

    let rest = collect_turn(&mut t.events).await;
    assert!(
        !rest
            .iter()
            .any(|msg| matches!(msg, EventMsg::ResponseItem(_) | EventMsg::AgentMessageDelta(_))),
        "items leaked after cancel: {rest:?}"
    );
    assert_eq!(rest.last(), Some(&interrupted()));

    t.session.run(hello(), None).await.expect("next turn");
    let prompts = t.channel.prompts();
    assert_eq!(prompts[1].previous_response_id, None);
    assert_eq!(
        prompts[1].input,
        vec![ResponseItem::from(ResponseInputItem::user_text("hello"))]
    );
}

#[tokio::test]
async fn cancel_during_confirmation_ignores_late_answer() {
    let (gate, mut requests) = ChannelConfirmationGate::new(1);
    let mut t = test_session(
        ApprovalPolicy::AskEveryTime,
        vec![ScriptedResponse::Events(vec![
            shell_call("call_1", &["rm", "notes.txt"]),
            completed("resp_1"),
        ])],
        Arc::new(gate),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    let request = timeout(Duration::from_secs(5), requests.recv())
        .await
        .expect("confirmation requested")
        .expect("gate still open");
    assert_eq!(request.command, vec!["rm".to_string(), "notes.txt".to_string()]);

    t.session.cancel().expect("cancel succeeds");
    run.await.expect("task joins").expect("turn resolves ok");

    assert!(!request.respond(CommandConfirmation::approved()));
    assert!(t.executor.actions().is_empty());
    assert_eq!(t.channel.request_count(), 1);
    let events = drain_events(&mut t.events);
    assert_eq!(events.last(), Some(&interrupted()));
}

#[tokio::test]
async fn cancel_during_execution_stops_the_action() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Events(vec![
            shell_call("call_1", &["sleep", "60"]),
            completed("resp_1"),
        ])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::new(ExecBehavior::BlockUntilCancelled),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    timeout(Duration::from_secs(5), async {
        while t.executor.actions().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("action started");

    t.session.cancel().expect("cancel succeeds");
    run.await.expect("task joins").expect("turn resolves ok");

    assert!(t.executor.observed_cancel());
    assert_eq!(t.channel.request_count(), 1);
    let events = drain_events(&mut t.events);
    assert!(!events.iter().any(|msg| matches!(
        msg,
        EventMsg::ResponseItem(ev) if matches!(ev.item, ResponseItem::FunctionCallOutput { .. })
    )));
    assert_eq!(events.last(), Some(&interrupted()));
}

#[tokio::test]
async fn cancel_and_terminate_are_idempotent() {
    let t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    t.session.cancel().expect("cancel while idle");
    t.session.cancel().expect("cancel twice");
    t.session.terminate().expect("terminate");
    t.session.terminate().expect("terminate twice");
    assert!(t.session.is_terminated());

    assert_matches!(t.session.cancel(), Err(LoopErr::Terminated));
    assert_matches!(t.session.run(hello(), None).await, Err(LoopErr::Terminated));
    assert_eq!(t.channel.request_count(), 0);
}

#[tokio::test]
async fn terminate_interrupts_the_running_turn() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Hang(vec![])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    wait_for_event(&mut t.events, |msg| matches!(msg, EventMsg::Loading(_))).await;

    t.session.terminate().expect("terminate");
    run.await.expect("task joins").expect("turn resolves ok");

    let rest = collect_turn(&mut t.events).await;
    assert_eq!(rest.last(), Some(&interrupted()));
    assert_matches!(t.session.run(hello(), None).await, Err(LoopErr::Terminated));
}

#[tokio::test]
async fn second_run_is_rejected_while_a_turn_is_active() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![ScriptedResponse::Hang(vec![])],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    wait_for_event(&mut t.events, |msg| matches!(msg, EventMsg::Loading(_))).await;

    assert_matches!(
        t.session.run(hello(), None).await,
        Err(LoopErr::TurnInProgress)
    );

    t.session.cancel().expect("cancel succeeds");
    run.await.expect("task joins").expect("turn resolves ok");
    assert_eq!(t.channel.request_count(), 1);
}

#[tokio::test]
async fn dropping_the_run_future_returns_session_to_idle() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Hang(vec![]),
            ScriptedResponse::Events(vec![completed("resp_2")]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    wait_for_event(&mut t.events, |msg| matches!(msg, EventMsg::Loading(_))).await;
    run.abort();
    assert!(run.await.is_err());

    t.session.run(hello(), None).await.expect("next turn runs");
    assert_eq!(t.session.last_response_id().as_deref(), Some("resp_2"));
}

#[tokio::test]
async fn loading_flags_alternate_across_requests() {
    let mut t = test_session(
        ApprovalPolicy::AlwaysApprove,
        vec![
            ScriptedResponse::Events(vec![shell_call("call_1", &["ls"]), completed("resp_1")]),
            ScriptedResponse::Events(vec![shell_call("call_2", &["pwd"]), completed("resp_2")]),
            ScriptedResponse::Hang(vec![]),
        ],
        Arc::new(ScriptedGate::default()),
        RecordingExecutor::succeeding(""),
    );

    let session = t.session.clone();
    let run = tokio::spawn(async move { session.run(hello(), None).await });
    let mut flags = Vec::new();
    while flags.len() < 5 {
        if let EventMsg::Loading(LoadingEvent { loading }) =
            wait_for_event(&mut t.events, |msg| matches!(msg, EventMsg::Loading(_))).await
        {
            flags.push(loading);
        }
    }
    t.session.cancel().expect("cancel succeeds");
    run.await.expect("task joins").expect("turn resolves ok");
    let rest = collect_turn(&mut t.events).await;
    flags.extend(core_test_support::loading_flags(&rest));

    assert_eq!(flags, vec![true, false, true, false, true, false]);
}
