use std::borrow::Cow;
use std::path::PathBuf;

use agent_loop_protocol::models::FunctionCallOutputPayload;
use agent_loop_protocol::models::ResponseInputItem;
use agent_loop_protocol::models::ShellToolCallParams;
use agent_loop_protocol::protocol::ApplyPatchCommand;

use crate::apply_patch::APPLY_PATCH_PROGRAM;
use crate::apply_patch::maybe_parse_apply_patch;
use crate::apply_patch::summarize_patch;
use crate::exec::ExecAction;
use crate::function_tool::FunctionCallError;

#[derive(Clone, Debug)]
pub(crate) enum ToolPayload {
    Function { arguments: String },
    LocalShell { params: ShellToolCallParams },
}

impl ToolPayload {
    pub(crate) fn log_payload(&self) -> Cow<'_, str> {
        match self {
            ToolPayload::Function { arguments } => Cow::Borrowed(arguments),
            ToolPayload::LocalShell { params } => Cow::Owned(params.command.join(" ")),
        }
    }
}

/// A command the model asked to run, awaiting approval.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PendingCommand {
    pub(crate) command: Vec<String>,
    pub(crate) apply_patch: Option<ApplyPatchCommand>,
    pub(crate) workdir: Option<String>,
    pub(crate) timeout_ms: Option<u64>,
}

impl PendingCommand {
    pub(crate) fn from_params(params: ShellToolCallParams) -> Result<Self, FunctionCallError> {
        if params.command.is_empty() {
            return Err(FunctionCallError::RespondToModel(
                "command must not be empty".to_string(),
            ));
        }
        let apply_patch = maybe_parse_apply_patch(&params.command).map(|patch| summarize_patch(&patch));
        Ok(Self {
            command: params.command,
            apply_patch,
            workdir: params.workdir,
            timeout_ms: params.timeout_ms,
        })
    }

    /// Swaps in the patch a reviewer chose instead of the proposed one. Has
    /// no effect on plain commands.
    pub(crate) fn replace_patch(&mut self, patch: ApplyPatchCommand) {
        if self.apply_patch.is_none() {
            return;
        }
        self.command = vec![APPLY_PATCH_PROGRAM.to_string(), patch.patch.clone()];
        self.apply_patch = Some(patch);
    }

    pub(crate) fn into_exec_action(self, cwd: PathBuf) -> ExecAction {
        match self.apply_patch {
            Some(patch) => ExecAction::ApplyPatch { patch, cwd },
            None => ExecAction::Command {
                command: self.command,
                cwd,
                timeout_ms: self.timeout_ms,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ToolOutput {
    pub(crate) content: String,
    pub(crate) success: bool,
}

impl ToolOutput {
    pub(crate) fn success(content: String) -> Self {
        Self {
            content,
            success: true,
        }
    }

    pub(crate) fn failure(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            success: false,
        }
    }

    pub(crate) fn into_response(self, call_id: &str) -> ResponseInputItem {
        ResponseInputItem::FunctionCallOutput {
            call_id: call_id.to_string(),
            output: FunctionCallOutputPayload {
                content: self.content,
                success: Some(self.success),
            },
        }
    }
}
