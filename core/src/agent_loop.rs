use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use agent_loop_protocol::SessionId;
use agent_loop_protocol::models::ResponseInputItem;
use agent_loop_protocol::protocol::ApprovalPolicy;
use agent_loop_protocol::protocol::ErrorEvent;
use agent_loop_protocol::protocol::EventMsg;
use agent_loop_protocol::protocol::LastResponseIdEvent;
use agent_loop_protocol::protocol::TurnAbortedEvent;
use agent_loop_protocol::protocol::TurnCompleteEvent;
use tracing::Instrument;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::agent_services::ActionExecutor;
use crate::agent_services::ConfirmationGate;
use crate::agent_services::ResponseChannel;
use crate::client::ModelClient;
use crate::config::Config;
use crate::error::Result;
use crate::events::EventReceiver;
use crate::events::EventSender;
use crate::state::SessionServices;
use crate::state::SessionState;
use crate::state::TurnContext;
use crate::state::TurnState;
use crate::state::lock_session;
use crate::turn::TurnController;
use crate::turn::TurnOutcome;

/// Everything needed to start a [`SessionLoop`].
pub struct AgentLoopParams {
    pub session_id: SessionId,
    pub model: String,
    pub instructions: Option<String>,
    pub approval_policy: ApprovalPolicy,
    /// Directory relative `workdir`s from the model are resolved against.
    pub cwd: PathBuf,
    pub response_channel: Arc<dyn ResponseChannel>,
    pub confirmation_gate: Arc<dyn ConfirmationGate>,
    pub executor: Arc<dyn ActionExecutor>,
}

impl AgentLoopParams {
    /// Params that talk to the provider configured in `config` through a
    /// [`ModelClient`].
    pub fn from_config(
        config: &Config,
        confirmation_gate: Arc<dyn ConfirmationGate>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let session_id = SessionId::new();
        let client = ModelClient::new(config.model_provider.clone(), session_id);
        Self {
            session_id,
            model: config.model.clone(),
            instructions: config.instructions.clone(),
            approval_policy: config.approval_policy.clone(),
            cwd: config.cwd.clone(),
            response_channel: Arc::new(client),
            confirmation_gate,
            executor,
        }
    }
}

/// A conversation with the model, driven one turn at a time.
///
/// At most one turn runs at a time: `run` is rejected with
/// [`LoopErr::TurnInProgress`](crate::LoopErr::TurnInProgress) while another
/// turn is in flight. `cancel` and `terminate` may be called from any task
/// while `run` is pending.
///
/// Progress is reported on the [`EventReceiver`] returned by [`Self::new`].
/// For each turn the stream is: `TurnStarted`, then any number of
/// `Loading(true) … Loading(false)` request brackets with the items of each
/// response inside them, then exactly one of `LastResponseId` +
/// `TurnComplete`, `TurnAborted`, or `Error`.
pub struct SessionLoop {
    session_id: SessionId,
    next_turn_id: AtomicU64,
    turn_context: TurnContext,
    services: SessionServices,
    state: Mutex<SessionState>,
    tx_event: EventSender,
}

impl SessionLoop {
    pub fn new(params: AgentLoopParams) -> (Self, EventReceiver) {
        let AgentLoopParams {
            session_id,
            model,
            instructions,
            approval_policy,
            cwd,
            response_channel,
            confirmation_gate,
            executor,
        } = params;
        let (tx_event, rx_event) = EventSender::new();
        info!(%session_id, %model, %approval_policy, "starting session");
        let session = Self {
            session_id,
            next_turn_id: AtomicU64::new(1),
            turn_context: TurnContext {
                model,
                instructions,
                approval_policy,
                cwd,
            },
            services: SessionServices {
                response_channel,
                confirmation_gate,
                executor,
            },
            state: Mutex::new(SessionState::new()),
            tx_event,
        };
        (session, rx_event)
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Response id the next turn continues from when `run` is not given one.
    pub fn last_response_id(&self) -> Option<String> {
        lock_session(&self.state).last_response_id()
    }

    pub fn is_terminated(&self) -> bool {
        lock_session(&self.state).is_terminated()
    }

    /// Runs one turn seeded with `input`.
    ///
    /// `previous_response_id` overrides the id remembered from the last
    /// completed turn. Resolves `Ok` when the turn completes or is cancelled
    /// (including by a reviewer's abort) and `Err` when a collaborator fails
    /// or the session cannot accept a turn.
    pub async fn run(
        &self,
        input: Vec<ResponseInputItem>,
        previous_response_id: Option<String>,
    ) -> Result<()> {
        let turn_id = self.next_turn_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (cancel, previous_response_id) =
            lock_session(&self.state).begin_turn(&turn_id, previous_response_id)?;
        let active = ActiveTurn {
            state: &self.state,
            turn_id: &turn_id,
            response_id: None,
        };

        self.tx_event.send(&turn_id, EventMsg::TurnStarted);
        let span = info_span!("turn", session_id = %self.session_id, turn_id = %turn_id);
        let turn = TurnState::new(turn_id.clone(), input, previous_response_id, cancel);
        let controller = TurnController::new(
            &self.turn_context,
            &self.services,
            &self.state,
            &self.tx_event,
            turn,
        );
        let outcome = controller.run().instrument(span).await;

        // The session is back to idle before the final event goes out, so a
        // consumer may start the next turn as soon as it sees it.
        match outcome {
            Ok(TurnOutcome::Completed {
                response_id,
                last_agent_message,
            }) => {
                active.finish(Some(response_id.clone()));
                self.tx_event.send(
                    &turn_id,
                    EventMsg::LastResponseId(LastResponseIdEvent { response_id }),
                );
                self.tx_event.send(
                    &turn_id,
                    EventMsg::TurnComplete(TurnCompleteEvent { last_agent_message }),
                );
                Ok(())
            }
            Ok(TurnOutcome::Aborted(reason)) => {
                active.finish(None);
                info!(%turn_id, ?reason, "turn aborted");
                self.tx_event.send(
                    &turn_id,
                    EventMsg::TurnAborted(TurnAbortedEvent { reason }),
                );
                Ok(())
            }
            Err(err) => {
                active.finish(None);
                warn!(%turn_id, "turn failed: {err}");
                self.tx_event.send(
                    &turn_id,
                    EventMsg::Error(ErrorEvent {
                        message: err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    /// Stops the running turn, if any. Its `run` resolves `Ok` shortly after;
    /// a pending confirmation is abandoned and any in-flight action is asked
    /// to stop. Calling it with no turn running does nothing.
    pub fn cancel(&self) -> Result<()> {
        lock_session(&self.state).cancel()
    }

    /// Cancels the running turn and refuses all further `run` and `cancel`
    /// calls. Terminating twice is a no-op.
    pub fn terminate(&self) -> Result<()> {
        if lock_session(&self.state).terminate() {
            info!(session_id = %self.session_id, "session terminated");
        }
        Ok(())
    }
}

/// Returns the session to idle when the turn ends, even if the `run` future
/// is dropped before completing.
struct ActiveTurn<'a> {
    state: &'a Mutex<SessionState>,
    turn_id: &'a str,
    response_id: Option<String>,
}

impl ActiveTurn<'_> {
    fn finish(mut self, response_id: Option<String>) {
        self.response_id = response_id;
    }
}

impl Drop for ActiveTurn<'_> {
    fn drop(&mut self) {
        lock_session(self.state).finish_turn(self.turn_id, self.response_id.take());
    }
}
