//! Session/turn state.
//!
//! `SessionState` is the only state shared between `run` and the
//! `cancel`/`terminate` entry points; everything else a turn needs lives in
//! `TurnState` and is owned by the running turn.

mod service;
mod session;
mod turn;

pub(crate) use service::SessionServices;
pub(crate) use session::SessionState;
pub(crate) use turn::TurnContext;
pub(crate) use turn::TurnState;

use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// Locks the session state. A panic while holding the lock leaves the state
/// consistent (every critical section is a handful of field updates), so a
/// poisoned lock is recovered rather than propagated.
pub(crate) fn lock_session(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
