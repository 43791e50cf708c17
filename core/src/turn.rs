//! Drives a single turn: stream a response, act on its tool calls, and
//! repeat until the model answers without asking for anything else.

use std::sync::Mutex;

use agent_loop_protocol::models::ResponseInputItem;
use agent_loop_protocol::models::ResponseItem;
use agent_loop_protocol::protocol::AgentMessageDeltaEvent;
use agent_loop_protocol::protocol::EventMsg;
use agent_loop_protocol::protocol::ResponseItemEvent;
use agent_loop_protocol::protocol::ReviewDecision;
use agent_loop_protocol::protocol::TurnAbortReason;
use futures::StreamExt;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::client_common::Prompt;
use crate::client_common::ResponseEvent;
use crate::error::LoopErr;
use crate::error::Result;
use crate::events::EventSender;
use crate::events::LoadingGuard;
use crate::exec::ExecError;
use crate::safety::SafetyCheck;
use crate::safety::assess_command_safety;
use crate::state::SessionServices;
use crate::state::SessionState;
use crate::state::TurnContext;
use crate::state::TurnState;
use crate::state::lock_session;
use crate::tools::context::ToolOutput;
use crate::tools::denied_output;
use crate::tools::exec_result_to_output;
use crate::tools::router::ToolCall;
use crate::tools::router::build_tool_call;

#[derive(Debug, PartialEq)]
pub(crate) enum TurnOutcome {
    Completed {
        response_id: String,
        last_agent_message: Option<String>,
    },
    Aborted(TurnAbortReason),
}

enum SamplingOutcome {
    Completed {
        response_id: String,
        tool_calls: Vec<ToolCall>,
        last_agent_message: Option<String>,
    },
    Cancelled,
}

enum ToolCallOutcome {
    Output(ResponseInputItem),
    /// The reviewer answered with [`ReviewDecision::Abort`].
    Abort,
    Cancelled,
}

pub(crate) struct TurnController<'a> {
    turn_context: &'a TurnContext,
    services: &'a SessionServices,
    state: &'a Mutex<SessionState>,
    events: &'a EventSender,
    turn: TurnState,
}

impl<'a> TurnController<'a> {
    pub(crate) fn new(
        turn_context: &'a TurnContext,
        services: &'a SessionServices,
        state: &'a Mutex<SessionState>,
        events: &'a EventSender,
        turn: TurnState,
    ) -> Self {
        Self {
            turn_context,
            services,
            state,
            events,
            turn,
        }
    }

    pub(crate) async fn run(mut self) -> Result<TurnOutcome> {
        let mut last_agent_message = None;
        loop {
            if self.turn.is_cancelled() {
                return Ok(TurnOutcome::Aborted(TurnAbortReason::Interrupted));
            }

            let (response_id, tool_calls) = match self.run_sampling_request().await? {
                SamplingOutcome::Cancelled => {
                    return Ok(TurnOutcome::Aborted(TurnAbortReason::Interrupted));
                }
                SamplingOutcome::Completed {
                    response_id,
                    tool_calls,
                    last_agent_message: message,
                } => {
                    if message.is_some() {
                        last_agent_message = message;
                    }
                    (response_id, tool_calls)
                }
            };

            if tool_calls.is_empty() {
                return Ok(TurnOutcome::Completed {
                    response_id,
                    last_agent_message,
                });
            }

            debug!(count = tool_calls.len(), %response_id, "processing tool calls");
            // Calls run one at a time, in the order the model emitted them.
            for call in tool_calls {
                match self.handle_tool_call(call).await? {
                    ToolCallOutcome::Output(output) => {
                        self.emit_unless_cancelled(EventMsg::ResponseItem(ResponseItemEvent {
                            item: output.clone().into(),
                        }));
                        self.turn.record_output(output);
                    }
                    ToolCallOutcome::Abort => {
                        return Ok(TurnOutcome::Aborted(TurnAbortReason::ReviewAborted));
                    }
                    ToolCallOutcome::Cancelled => {
                        return Ok(TurnOutcome::Aborted(TurnAbortReason::Interrupted));
                    }
                }
            }
        }
    }

    /// Issues one request and drains its stream. Items are forwarded as they
    /// arrive; tool calls are only acted upon once the response completed.
    async fn run_sampling_request(&mut self) -> Result<SamplingOutcome> {
        let turn_id = self.turn.turn_id.clone();
        let cancel = self.turn.cancel.clone();
        let _loading = LoadingGuard::start(self.events, &turn_id);

        let prompt = Prompt {
            model: self.turn_context.model.clone(),
            input: self.turn.input.clone(),
            instructions: self.turn_context.instructions.clone(),
            previous_response_id: self.turn.previous_response_id.clone(),
        };

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(SamplingOutcome::Cancelled),
            stream = self.services.response_channel.stream(&prompt) => stream?,
        };

        let mut tool_calls = Vec::new();
        let mut last_agent_message = None;
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(SamplingOutcome::Cancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else {
                return Err(LoopErr::Stream(
                    "stream closed before response.completed".into(),
                ));
            };

            match event? {
                ResponseEvent::Created => {}
                ResponseEvent::OutputTextDelta(delta) => {
                    self.emit_unless_cancelled(EventMsg::AgentMessageDelta(
                        AgentMessageDeltaEvent { delta },
                    ));
                }
                ResponseEvent::OutputItemDone(item) => {
                    if let Some(text) = item.assistant_text() {
                        last_agent_message = Some(text);
                    }
                    match build_tool_call(&item) {
                        Ok(Some(call)) => tool_calls.push(call),
                        Ok(None) => {}
                        // Without an id there is nowhere to send an output.
                        Err(e) => warn!("ignoring tool call: {e}"),
                    }
                    if is_replayed_in_turn(&item) {
                        self.turn.input.push(item.clone());
                    }
                    self.emit_unless_cancelled(EventMsg::ResponseItem(ResponseItemEvent { item }));
                }
                ResponseEvent::Completed { response_id } => {
                    return Ok(SamplingOutcome::Completed {
                        response_id,
                        tool_calls,
                        last_agent_message,
                    });
                }
            }
        }
    }

    async fn handle_tool_call(&mut self, call: ToolCall) -> Result<ToolCallOutcome> {
        let call_id = call.call_id.clone();
        debug!(
            tool = %call.tool_name,
            %call_id,
            payload = %call.payload.log_payload(),
            "handling tool call"
        );

        let mut pending = match call.into_pending_command() {
            Ok(pending) => pending,
            Err(err) => {
                return Ok(ToolCallOutcome::Output(
                    ToolOutput::failure(err.to_string()).into_response(&call_id),
                ));
            }
        };

        let safety = {
            let state = lock_session(self.state);
            assess_command_safety(
                &pending.command,
                pending.apply_patch.as_ref(),
                &self.turn_context.approval_policy,
                &state.approved_commands,
            )
        };

        if safety == SafetyCheck::AskUser {
            let cancel = self.turn.cancel.clone();
            // Cancelling drops the pending confirmation; an answer that
            // arrives afterwards goes nowhere.
            let confirmation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(ToolCallOutcome::Cancelled),
                confirmation = self
                    .services
                    .confirmation_gate
                    .get_command_confirmation(&pending.command, pending.apply_patch.as_ref()) => confirmation,
            };
            if cancel.is_cancelled() {
                return Ok(ToolCallOutcome::Cancelled);
            }

            info!(%call_id, review = ?confirmation.review, "command reviewed");
            match confirmation.review {
                ReviewDecision::Approved => {}
                ReviewDecision::ApprovedForSession => {
                    lock_session(self.state).add_approved_command(pending.command.clone());
                }
                ReviewDecision::Denied => {
                    return Ok(ToolCallOutcome::Output(
                        denied_output(confirmation.custom_deny_message).into_response(&call_id),
                    ));
                }
                ReviewDecision::Abort => return Ok(ToolCallOutcome::Abort),
            }
            if let Some(patch) = confirmation.apply_patch {
                pending.replace_patch(patch);
            }
        }

        if self.turn.is_cancelled() {
            return Ok(ToolCallOutcome::Cancelled);
        }

        let cwd = self.turn_context.resolve_path(pending.workdir.clone());
        let action = pending.into_exec_action(cwd);
        let result = self
            .services
            .executor
            .execute(action, self.turn.cancel.child_token())
            .await;
        if self.turn.is_cancelled() {
            debug!(%call_id, "discarding result of cancelled action");
            return Ok(ToolCallOutcome::Cancelled);
        }
        if let Err(ExecError::Fatal(message)) = &result {
            return Err(LoopErr::Fatal(message.clone()));
        }

        Ok(ToolCallOutcome::Output(
            exec_result_to_output(result).into_response(&call_id),
        ))
    }

    /// Emits `msg` unless the turn has been cancelled. The check and the send
    /// happen under the session lock, so once `cancel()` returns no further
    /// item of this turn reaches the consumer.
    fn emit_unless_cancelled(&self, msg: EventMsg) {
        let _state = lock_session(self.state);
        if !self.turn.is_cancelled() {
            self.events.send(&self.turn.turn_id, msg);
        }
    }
}

/// Model output resent with later requests of the same turn so every
/// function call output has its call in context.
fn is_replayed_in_turn(item: &ResponseItem) -> bool {
    matches!(
        item,
        ResponseItem::Message { .. }
            | ResponseItem::FunctionCall { .. }
            | ResponseItem::LocalShellCall { .. }
    )
}
