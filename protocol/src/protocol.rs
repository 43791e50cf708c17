//! Defines the protocol between an agent session and the client driving it.
//!
//! Inputs reach a session through `run`/`cancel`/`terminate` calls; everything
//! the session reports flows back as an ordered stream of [`Event`]s.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

use crate::models::ResponseItem;

/// Determines which proposed commands run without consulting the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ApprovalPolicy {
    /// Every command and patch is executed without asking.
    AlwaysApprove,

    /// Known read-only commands, and commands matching one of the wildcard
    /// patterns in `commands`, run without asking. Everything else (patches
    /// included) asks the user.
    Allowlist {
        #[serde(default)]
        commands: Vec<String>,
    },

    /// Every command asks the user, unless it was approved for the session.
    #[default]
    AskEveryTime,
}

/// User's decision in response to a confirmation request.
#[derive(Debug, Default, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// User has approved this command and the agent should execute it.
    Approved,

    /// User has approved this command and wants to automatically approve any
    /// future identical instances for the remainder of the session.
    ApprovedForSession,

    /// User has denied this command and the agent should not execute it, but
    /// it should continue the turn and try something else.
    #[default]
    Denied,

    /// User has denied this command and the agent should stop the turn.
    Abort,
}

impl ReviewDecision {
    pub fn is_approved(self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedForSession)
    }
}

/// Result of a confirmation request.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfirmation {
    #[serde(default)]
    pub review: ReviewDecision,

    /// Replacement patch chosen by the reviewer. Only honoured for patch
    /// applications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apply_patch: Option<ApplyPatchCommand>,

    /// Message fed back to the model instead of the default rejection text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_deny_message: Option<String>,
}

impl CommandConfirmation {
    pub fn approved() -> Self {
        Self {
            review: ReviewDecision::Approved,
            ..Default::default()
        }
    }

    pub fn approved_for_session() -> Self {
        Self {
            review: ReviewDecision::ApprovedForSession,
            ..Default::default()
        }
    }

    pub fn denied(reason: Option<String>) -> Self {
        Self {
            review: ReviewDecision::Denied,
            apply_patch: None,
            custom_deny_message: reason,
        }
    }

    pub fn abort() -> Self {
        Self {
            review: ReviewDecision::Abort,
            ..Default::default()
        }
    }
}

/// Structured description of a patch the model wants to apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyPatchCommand {
    /// Raw patch text, `*** Begin Patch` envelope included.
    pub patch: String,
    pub changes: BTreeMap<PathBuf, FileChange>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Add {
        content: String,
    },
    Delete,
    Update {
        unified_diff: String,
        move_path: Option<PathBuf>,
    },
}

/// Event queue entry, correlated to the turn that produced it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Event {
    /// Identifier of the turn this event belongs to.
    pub id: String,
    /// Payload
    pub msg: EventMsg,
}

/// Output of a session, delivered strictly in the order it was produced.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Display)]
#[serde(tag = "type", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventMsg {
    /// A turn began processing its input.
    TurnStarted,

    /// A response item produced by the model, forwarded verbatim.
    ResponseItem(ResponseItemEvent),

    /// Incremental assistant text, ahead of the final message item.
    AgentMessageDelta(AgentMessageDeltaEvent),

    /// Brackets every model request: `true` before it is issued, `false`
    /// once it is drained, failed or abandoned.
    Loading(LoadingEvent),

    /// Response id of the last model response of a completed turn; pass it
    /// back as `previous_response_id` to continue the conversation.
    LastResponseId(LastResponseIdEvent),

    /// The turn reached a terminal model response.
    TurnComplete(TurnCompleteEvent),

    /// The turn stopped before completing.
    TurnAborted(TurnAbortedEvent),

    /// The turn failed; `run` reports the same failure.
    Error(ErrorEvent),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResponseItemEvent {
    pub item: ResponseItem,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AgentMessageDeltaEvent {
    pub delta: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct LoadingEvent {
    pub loading: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LastResponseIdEvent {
    pub response_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TurnCompleteEvent {
    pub last_agent_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TurnAbortedEvent {
    pub reason: TurnAbortReason,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnAbortReason {
    /// `cancel()` or `terminate()` was called.
    Interrupted,
    /// The reviewer answered a confirmation with [`ReviewDecision::Abort`].
    ReviewAborted,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ErrorEvent {
    pub message: String,
}
