//! Turn-scoped state and configuration.

use std::path::PathBuf;

use agent_loop_protocol::models::ResponseInputItem;
use agent_loop_protocol::models::ResponseItem;
use agent_loop_protocol::protocol::ApprovalPolicy;
use tokio_util::sync::CancellationToken;

/// Settings fixed for the lifetime of the session.
#[derive(Debug, Clone)]
pub(crate) struct TurnContext {
    pub(crate) model: String,
    pub(crate) instructions: Option<String>,
    pub(crate) approval_policy: ApprovalPolicy,
    /// The session's current working directory. All relative paths provided by
    /// the model are resolved against this path instead of
    /// `std::env::current_dir()`.
    pub(crate) cwd: PathBuf,
}

impl TurnContext {
    pub(crate) fn resolve_path(&self, path: Option<String>) -> PathBuf {
        path.as_ref()
            .map(PathBuf::from)
            .map_or_else(|| self.cwd.clone(), |p| self.cwd.join(p))
    }
}

pub(crate) struct TurnState {
    pub(crate) turn_id: String,
    /// Everything sent so far in this turn: the caller's input, the model's
    /// tool calls and their outputs. Each request resends all of it.
    pub(crate) input: Vec<ResponseItem>,
    /// Fixed for the whole turn; it only advances once the turn completes.
    pub(crate) previous_response_id: Option<String>,
    pub(crate) cancel: CancellationToken,
}

impl TurnState {
    pub(crate) fn new(
        turn_id: String,
        input: Vec<ResponseInputItem>,
        previous_response_id: Option<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            turn_id,
            input: input.into_iter().map(ResponseItem::from).collect(),
            previous_response_id,
            cancel,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn record_output(&mut self, item: ResponseInputItem) {
        self.input.push(item.into());
    }
}
