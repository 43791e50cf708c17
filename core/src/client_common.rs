use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use agent_loop_protocol::models::ResponseItem;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use crate::error::Result;

/// API request payload for a single model turn.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Prompt {
    /// Model identifier the request is addressed to.
    pub model: String,

    /// Conversation context input items.
    pub input: Vec<ResponseItem>,

    /// System instructions sent with every request of the session.
    pub instructions: Option<String>,

    /// Continue server-side state from this response instead of resending
    /// prior turns.
    pub previous_response_id: Option<String>,
}

#[derive(Debug)]
pub enum ResponseEvent {
    Created,
    OutputItemDone(ResponseItem),
    OutputTextDelta(String),
    Completed { response_id: String },
}

/// Request object that is serialized as JSON and POST'ed when using the
/// Responses API.
#[derive(Debug, Serialize)]
pub(crate) struct ResponsesApiRequest<'a> {
    pub(crate) model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) instructions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) previous_response_id: Option<&'a str>,
    pub(crate) input: Vec<&'a ResponseItem>,
    pub(crate) tools: &'a [Value],
    pub(crate) tool_choice: &'static str,
    pub(crate) parallel_tool_calls: bool,
    pub(crate) store: bool,
    pub(crate) stream: bool,
}

impl<'a> ResponsesApiRequest<'a> {
    pub(crate) fn new(prompt: &'a Prompt, tools: &'a [Value]) -> Self {
        Self {
            model: &prompt.model,
            instructions: prompt.instructions.as_deref(),
            previous_response_id: prompt.previous_response_id.as_deref(),
            // `Other` carries nothing the API could accept back.
            input: prompt
                .input
                .iter()
                .filter(|item| !matches!(item, ResponseItem::Other))
                .collect(),
            tools,
            tool_choice: "auto",
            parallel_tool_calls: false,
            store: true,
            stream: true,
        }
    }
}

/// The single function tool advertised to the model. Calls to it come back
/// as `function_call` items named `shell`.
pub(crate) fn create_shell_tool() -> Value {
    json!({
        "type": "function",
        "name": "shell",
        "description": "Runs a shell command, and returns its output.",
        "strict": false,
        "parameters": {
            "type": "object",
            "properties": {
                "command": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "The command to execute"
                },
                "workdir": {
                    "type": "string",
                    "description": "The working directory to execute the command in"
                },
                "timeout_ms": {
                    "type": "number",
                    "description": "The timeout for the command in milliseconds"
                }
            },
            "required": ["command"],
            "additionalProperties": false
        }
    })
}

pub struct ResponseStream {
    pub rx_event: mpsc::Receiver<Result<ResponseEvent>>,
}

impl Stream for ResponseStream {
    type Item = Result<ResponseEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx_event.poll_recv(cx)
    }
}
