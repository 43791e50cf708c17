//! Session-wide mutable state.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::error::LoopErr;
use crate::error::Result;

#[derive(Debug)]
pub(crate) enum SessionPhase {
    /// No turn is running. `last_response_id` continues the conversation when
    /// the next `run` does not name a previous response itself.
    Idle { last_response_id: Option<String> },
    Active {
        turn_id: String,
        cancel: CancellationToken,
        last_response_id: Option<String>,
    },
    Terminated,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) phase: SessionPhase,
    pub(crate) approved_commands: HashSet<Vec<String>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle {
                last_response_id: None,
            },
            approved_commands: HashSet::new(),
        }
    }
}

impl SessionState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks `turn_id` as running. Returns the token that cancels it and the
    /// response id the turn continues from.
    pub(crate) fn begin_turn(
        &mut self,
        turn_id: &str,
        previous_response_id: Option<String>,
    ) -> Result<(CancellationToken, Option<String>)> {
        let last_response_id = match &mut self.phase {
            SessionPhase::Terminated => return Err(LoopErr::Terminated),
            SessionPhase::Active { .. } => return Err(LoopErr::TurnInProgress),
            SessionPhase::Idle { last_response_id } => last_response_id.take(),
        };
        let cancel = CancellationToken::new();
        let continue_from = previous_response_id.or_else(|| last_response_id.clone());
        self.phase = SessionPhase::Active {
            turn_id: turn_id.to_string(),
            cancel: cancel.clone(),
            last_response_id,
        };
        Ok((cancel, continue_from))
    }

    /// Returns the session to idle once `turn_id` has ended, remembering
    /// `response_id` if the turn completed. A terminated session stays
    /// terminated.
    pub(crate) fn finish_turn(&mut self, turn_id: &str, response_id: Option<String>) {
        let SessionPhase::Active {
            turn_id: active,
            last_response_id,
            ..
        } = &mut self.phase
        else {
            return;
        };
        if active.as_str() != turn_id {
            return;
        }
        let last_response_id = response_id.or_else(|| last_response_id.take());
        self.phase = SessionPhase::Idle { last_response_id };
    }

    pub(crate) fn cancel(&mut self) -> Result<()> {
        match &self.phase {
            SessionPhase::Terminated => Err(LoopErr::Terminated),
            SessionPhase::Active { cancel, .. } => {
                cancel.cancel();
                Ok(())
            }
            SessionPhase::Idle { .. } => Ok(()),
        }
    }

    /// Cancels the running turn, if any, and refuses all further work.
    /// Returns `false` if the session was already terminated.
    pub(crate) fn terminate(&mut self) -> bool {
        match std::mem::replace(&mut self.phase, SessionPhase::Terminated) {
            SessionPhase::Terminated => false,
            SessionPhase::Active { cancel, .. } => {
                cancel.cancel();
                true
            }
            SessionPhase::Idle { .. } => true,
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        matches!(self.phase, SessionPhase::Terminated)
    }

    pub(crate) fn last_response_id(&self) -> Option<String> {
        match &self.phase {
            SessionPhase::Idle { last_response_id }
            | SessionPhase::Active {
                last_response_id, ..
            } => last_response_id.clone(),
            SessionPhase::Terminated => None,
        }
    }

    pub(crate) fn add_approved_command(&mut self, command: Vec<String>) {
        self.approved_commands.insert(command);
    }
}
