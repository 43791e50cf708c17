use agent_loop_protocol::models::LocalShellAction;
use agent_loop_protocol::models::ResponseItem;
use agent_loop_protocol::models::ShellToolCallParams;

use crate::function_tool::FunctionCallError;
use crate::tools::context::PendingCommand;
use crate::tools::context::ToolPayload;

/// Function names the model may use to request a shell command.
const SHELL_TOOL_NAMES: [&str; 2] = ["shell", "container.exec"];

#[derive(Clone, Debug)]
pub(crate) struct ToolCall {
    pub(crate) tool_name: String,
    pub(crate) call_id: String,
    pub(crate) payload: ToolPayload,
}

impl ToolCall {
    /// Extracts the command the call asks for. Errors become the call's
    /// output so the model can correct itself.
    pub(crate) fn into_pending_command(self) -> Result<PendingCommand, FunctionCallError> {
        let params = match self.payload {
            ToolPayload::LocalShell { params } => params,
            ToolPayload::Function { arguments } => {
                if !SHELL_TOOL_NAMES.contains(&self.tool_name.as_str()) {
                    return Err(FunctionCallError::RespondToModel(format!(
                        "unsupported call: {}",
                        self.tool_name
                    )));
                }
                serde_json::from_str::<ShellToolCallParams>(&arguments).map_err(|e| {
                    FunctionCallError::RespondToModel(format!(
                        "failed to parse function arguments: {e}"
                    ))
                })?
            }
        };
        PendingCommand::from_params(params)
    }
}

/// Returns the tool call carried by `item`, or `None` for items that need no
/// output (messages, reasoning, ...).
pub(crate) fn build_tool_call(item: &ResponseItem) -> Result<Option<ToolCall>, FunctionCallError> {
    match item {
        ResponseItem::FunctionCall {
            name,
            arguments,
            call_id,
            ..
        } => Ok(Some(ToolCall {
            tool_name: name.clone(),
            call_id: call_id.clone(),
            payload: ToolPayload::Function {
                arguments: arguments.clone(),
            },
        })),
        ResponseItem::LocalShellCall { action, .. } => {
            let call_id = item
                .tool_call_id()
                .ok_or(FunctionCallError::MissingLocalShellCallId)?
                .to_string();

            match action {
                LocalShellAction::Exec(exec) => {
                    let params = ShellToolCallParams {
                        command: exec.command.clone(),
                        workdir: exec.working_directory.clone(),
                        timeout_ms: exec.timeout_ms,
                    };
                    Ok(Some(ToolCall {
                        tool_name: "local_shell".to_string(),
                        call_id,
                        payload: ToolPayload::LocalShell { params },
                    }))
                }
            }
        }
        _ => Ok(None),
    }
}
