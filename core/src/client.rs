use std::time::Duration;

use agent_loop_protocol::SessionId;
use agent_loop_protocol::models::ResponseItem;
use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::debug;
use tracing::trace;

use crate::agent_services::ResponseChannel;
use crate::client_common::Prompt;
use crate::client_common::ResponseEvent;
use crate::client_common::ResponseStream;
use crate::client_common::ResponsesApiRequest;
use crate::client_common::create_shell_tool;
use crate::error::LoopErr;
use crate::error::Result;
use crate::model_provider_info::ModelProviderInfo;

#[derive(Debug, Deserialize)]
struct Error {
    message: Option<String>,
}

/// Streams model responses from an OpenAI-compatible Responses API endpoint.
///
/// Each call to [`ResponseChannel::stream`] issues exactly one POST; failed
/// requests are reported to the caller and never retried.
#[derive(Debug, Clone)]
pub struct ModelClient {
    client: reqwest::Client,
    provider: ModelProviderInfo,
    session_id: SessionId,
    tools: Vec<Value>,
}

impl ModelClient {
    pub fn new(provider: ModelProviderInfo, session_id: SessionId) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
            session_id,
            tools: vec![create_shell_tool()],
        }
    }

    async fn stream_responses(&self, prompt: &Prompt) -> Result<ResponseStream> {
        let payload = ResponsesApiRequest::new(prompt, &self.tools);

        trace!(
            "POST to {}: {}",
            self.provider.get_full_url(),
            serde_json::to_string(&payload)?
        );

        let res = self
            .provider
            .create_request_builder(&self.client)?
            .header("OpenAI-Beta", "responses=experimental")
            .header("session_id", self.session_id.to_string())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        trace!("Response status: {status}");
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(LoopErr::UnexpectedStatus(status, body));
        }

        let (tx_event, rx_event) = mpsc::channel::<Result<ResponseEvent>>(1600);

        // spawn task to process SSE
        let stream = res.bytes_stream().map_err(LoopErr::Reqwest);
        tokio::spawn(process_sse(
            stream,
            tx_event,
            self.provider.stream_idle_timeout(),
        ));

        Ok(ResponseStream { rx_event })
    }
}

#[async_trait]
impl ResponseChannel for ModelClient {
    async fn stream(&self, prompt: &Prompt) -> Result<ResponseStream> {
        self.stream_responses(prompt).await
    }
}

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(rename = "type")]
    kind: String,
    response: Option<Value>,
    item: Option<Value>,
    delta: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseCompleted {
    id: String,
}

/// Translates raw SSE frames into [`ResponseEvent`]s.
///
/// `response.completed` is held back until the body ends so that the
/// consumer never sees a completion followed by more events. The task ends
/// as soon as the receiving side is dropped, even while the body is idle,
/// and dropping `stream` closes the HTTP body.
async fn process_sse<S>(stream: S, tx_event: mpsc::Sender<Result<ResponseEvent>>, idle_timeout: Duration)
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut stream = stream.eventsource();

    // The response id returned from the "complete" message.
    let mut response_completed: Option<ResponseCompleted> = None;
    let mut response_error: Option<LoopErr> = None;

    loop {
        let next = tokio::select! {
            biased;
            _ = tx_event.closed() => {
                debug!("response stream dropped; closing SSE body");
                return;
            }
            next = timeout(idle_timeout, stream.next()) => next,
        };
        let sse = match next {
            Ok(Some(Ok(sse))) => sse,
            Ok(Some(Err(e))) => {
                debug!("SSE Error: {e:#}");
                let _ = tx_event.send(Err(LoopErr::Stream(e.to_string()))).await;
                return;
            }
            Ok(None) => {
                let event = match response_completed {
                    Some(ResponseCompleted { id: response_id }) => {
                        Ok(ResponseEvent::Completed { response_id })
                    }
                    None => Err(response_error.unwrap_or(LoopErr::Stream(
                        "stream closed before response.completed".into(),
                    ))),
                };
                let _ = tx_event.send(event).await;
                return;
            }
            Err(_) => {
                let _ = tx_event
                    .send(Err(LoopErr::Stream("idle timeout waiting for SSE".into())))
                    .await;
                return;
            }
        };

        trace!("SSE event: {}", sse.data);

        let event: SseEvent = match serde_json::from_str(&sse.data) {
            Ok(event) => event,
            Err(e) => {
                debug!("Failed to parse SSE event: {e}, data: {}", &sse.data);
                continue;
            }
        };

        match event.kind.as_str() {
            // Items are forwarded as soon as they are final; the duplicate
            // `output` array inside `response.completed` is ignored.
            "response.output_item.done" => {
                let Some(item_val) = event.item else { continue };
                let Ok(item) = serde_json::from_value::<ResponseItem>(item_val) else {
                    debug!("failed to parse ResponseItem from output_item.done");
                    continue;
                };

                let event = ResponseEvent::OutputItemDone(item);
                if tx_event.send(Ok(event)).await.is_err() {
                    return;
                }
            }
            "response.output_text.delta" => {
                if let Some(delta) = event.delta {
                    let event = ResponseEvent::OutputTextDelta(delta);
                    if tx_event.send(Ok(event)).await.is_err() {
                        return;
                    }
                }
            }
            "response.created" => {
                if event.response.is_some() && tx_event.send(Ok(ResponseEvent::Created)).await.is_err() {
                    return;
                }
            }
            "response.failed" => {
                if let Some(resp_val) = event.response {
                    let mut message = "response.failed event received".to_string();
                    if let Some(error) = resp_val.get("error") {
                        match serde_json::from_value::<Error>(error.clone()) {
                            Ok(Error {
                                message: Some(api_message),
                            }) => message = api_message,
                            Ok(_) => {}
                            Err(e) => debug!("failed to parse ErrorResponse: {e}"),
                        }
                    }
                    response_error = Some(LoopErr::Stream(message));
                }
            }
            "response.completed" => {
                if let Some(resp_val) = event.response {
                    match serde_json::from_value::<ResponseCompleted>(resp_val) {
                        Ok(r) => response_completed = Some(r),
                        Err(e) => debug!("failed to parse ResponseCompleted: {e}"),
                    }
                }
            }
            _ => {}
        }
    }
}
