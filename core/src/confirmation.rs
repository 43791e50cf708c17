use agent_loop_protocol::protocol::ApplyPatchCommand;
use agent_loop_protocol::protocol::CommandConfirmation;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::agent_services::ConfirmationGate;

/// A command waiting for a reviewer's answer.
#[derive(Debug)]
pub struct ConfirmationRequest {
    pub command: Vec<String>,
    pub apply_patch: Option<ApplyPatchCommand>,
    responder: oneshot::Sender<CommandConfirmation>,
}

impl ConfirmationRequest {
    /// Delivers the reviewer's answer. Returns `false` if the session stopped
    /// waiting (the turn was cancelled), in which case the answer is dropped.
    pub fn respond(self, confirmation: CommandConfirmation) -> bool {
        self.responder.send(confirmation).is_ok()
    }

    /// Whether the session is still waiting for this answer.
    pub fn is_pending(&self) -> bool {
        !self.responder.is_closed()
    }

    /// Resolves once the session stops waiting for this answer, e.g. because
    /// the turn was cancelled.
    pub async fn withdrawn(&mut self) {
        self.responder.closed().await;
    }
}

/// Forwards confirmation requests to whoever holds the matching receiver,
/// e.g. a terminal prompt or a UI.
///
/// A request that is dropped without an answer counts as
/// [`ReviewDecision::Denied`](agent_loop_protocol::protocol::ReviewDecision::Denied).
#[derive(Debug, Clone)]
pub struct ChannelConfirmationGate {
    tx_request: mpsc::Sender<ConfirmationRequest>,
}

impl ChannelConfirmationGate {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ConfirmationRequest>) {
        let (tx_request, rx_request) = mpsc::channel(capacity);
        (Self { tx_request }, rx_request)
    }
}

#[async_trait]
impl ConfirmationGate for ChannelConfirmationGate {
    async fn get_command_confirmation(
        &self,
        command: &[String],
        apply_patch: Option<&ApplyPatchCommand>,
    ) -> CommandConfirmation {
        let (responder, rx) = oneshot::channel();
        let request = ConfirmationRequest {
            command: command.to_vec(),
            apply_patch: apply_patch.cloned(),
            responder,
        };
        if self.tx_request.send(request).await.is_err() {
            warn!("no reviewer is listening for confirmation requests; denying");
            return CommandConfirmation::default();
        }
        rx.await.unwrap_or_default()
    }
}
