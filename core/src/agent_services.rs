//! Collaborators a session depends on. Each one is injected as a trait object
//! so embedders and tests can swap the network, the reviewer and the sandbox
//! independently.

use agent_loop_protocol::protocol::ApplyPatchCommand;
use agent_loop_protocol::protocol::CommandConfirmation;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::client_common::Prompt;
use crate::client_common::ResponseStream;
use crate::error::Result;
use crate::exec::ExecAction;
use crate::exec::ExecError;
use crate::exec::ExecOutput;

/// Issues one model request and yields its events in wire order.
///
/// Dropping the returned stream abandons the request.
#[async_trait]
pub trait ResponseChannel: Send + Sync {
    async fn stream(&self, prompt: &Prompt) -> Result<ResponseStream>;
}

/// Asks a reviewer whether a proposed command may run.
///
/// The future resolves exactly once. A session may drop it unresolved when the
/// turn is cancelled; implementations must tolerate that.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn get_command_confirmation(
        &self,
        command: &[String],
        apply_patch: Option<&ApplyPatchCommand>,
    ) -> CommandConfirmation;
}

/// Runs approved actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Executes `action`. Implementations should stop early once `cancel` is
    /// triggered; any result produced after that point is discarded.
    async fn execute(
        &self,
        action: ExecAction,
        cancel: CancellationToken,
    ) -> std::result::Result<ExecOutput, ExecError>;
}
