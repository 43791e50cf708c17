#![cfg(not(target_os = "windows"))]

use assert_cmd::Command;
use core_test_support::responses::ev_assistant_message;
use core_test_support::responses::ev_completed;
use core_test_support::responses::ev_function_call;
use core_test_support::responses::sse;
use core_test_support::responses::sse_response;
use core_test_support::skip_if_no_network;
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::matchers::method;
use wiremock::matchers::path;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn denial_typed_on_stdin_reaches_the_model() {
    skip_if_no_network!();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(sse_response(sse(vec![
            ev_function_call("call_1", "shell", r#"{"command":["touch","created.txt"]}"#),
            ev_completed("resp_1"),
        ])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/responses"))
        .respond_with(sse_response(sse(vec![
            ev_assistant_message("msg_1", "ok, I will not"),
            ev_completed("resp_2"),
        ])))
        .mount(&server)
        .await;

    let home = TempDir::new().expect("tempdir");
    Command::cargo_bin("agent-loop")
        .expect("binary builds")
        .env("AGENT_LOOP_HOME", home.path())
        .arg("-c")
        .arg(format!("model_provider.base_url={}/v1", server.uri()))
        .arg("-c")
        .arg("model_provider.env_key=PATH")
        .arg("-C")
        .arg(home.path())
        .arg("--approval-policy")
        .arg("ask-every-time")
        .arg("create a file")
        .write_stdin("n please do not touch the disk\n")
        .assert()
        .success();

    assert!(!home.path().join("created.txt").exists());

    let requests = server.received_requests().await.expect("recorded requests");
    assert_eq!(requests.len(), 2);
    let body: Value = serde_json::from_slice(&requests[1].body).expect("json body");
    let input = body["input"].as_array().expect("input array");
    let output = input
        .iter()
        .find(|item| item["type"] == "function_call_output")
        .expect("function call output sent");
    assert_eq!(output["call_id"], "call_1");
    assert_eq!(output["output"], "please do not touch the disk");
}
