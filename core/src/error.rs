use std::io;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoopErr>;

#[derive(Error, Debug)]
pub enum LoopErr {
    /// `run`, `cancel` or `terminate` was called after the session was
    /// terminated.
    #[error("session already terminated")]
    Terminated,

    /// `run` was called while another turn of the same session was still in
    /// flight. Turns never overlap; callers must wait for the previous `run`
    /// to resolve (or cancel it) first.
    #[error("a turn is already running on this session")]
    TurnInProgress,

    /// The response stream failed or ended before `response.completed`.
    #[error("stream disconnected before completion: {0}")]
    Stream(String),

    /// Returned by [`crate::ModelClient`] when the provider answers with a
    /// non-success status. Requests are never retried.
    #[error("unexpected status {0}: {1}")]
    UnexpectedStatus(StatusCode, String),

    /// The action executor reported an error it cannot recover from.
    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("missing environment variable: `{var}`")]
    EnvVar { var: String },

    // -----------------------------------------------------------------
    // Automatic conversions for common external error types
    // -----------------------------------------------------------------
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LoopErr {
    /// Whether the error comes from calling the session in the wrong state
    /// rather than from a failed turn.
    pub fn is_state_error(&self) -> bool {
        matches!(self, LoopErr::Terminated | LoopErr::TurnInProgress)
    }
}
