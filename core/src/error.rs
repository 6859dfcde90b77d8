//! Errors raised by the functional core itself (as opposed to storage or
//! transport errors, which belong to the `lss` and `coordinator` crates).

use thiserror::Error;

/// Errors the functional core can raise while producing, consuming or
/// querying. None of these indicate storage or I/O failure - they are all
/// decided purely from in-memory state.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A [`crate::Command`] named a `command_type` with no registered
    /// [`crate::ChangeState`] entry.
    #[error("unknown command type: {0}")]
    UnknownCommand(String),

    /// A [`crate::ChangeState::map`] implementation returned an error while
    /// interpreting a command. The whole transaction is rolled back.
    #[error("mapper failed for {view_id}: {reason}")]
    MapperFailure {
        /// The `view_id` of the `ChangeState` entry whose mapper failed.
        view_id: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },

    /// The state-machine fixpoint loop exceeded its recursion budget.
    /// Indicates a state machine that re-triggers itself (directly or
    /// through a cycle) without ever reaching a quiescent dirty set.
    #[error("state machine fixpoint exceeded recursion limit of {limit}")]
    RecursionLimitExceeded {
        /// The configured maximum recursion depth.
        limit: usize,
    },
}
