//! Errors a transaction submitted through the coordinator can fail with.

use thiserror::Error;
use txn_core::CoreError;

/// The outcome of a failed `submit`.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The critical section failed in-memory (unknown command, mapper
    /// rejection, runaway state-machine recursion). The transaction was
    /// rolled back; no events were appended.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The LSS append failed. Fatal: the coordinator has already invoked
    /// its [`crate::FatalHandler`] by the time this is returned, since a
    /// store that cannot be trusted to durably record what it just
    /// acknowledged in-memory cannot be operated against safely.
    #[error("storage error during append: {0}")]
    Storage(String),

    /// The coordinator's worker loop has shut down and is no longer
    /// accepting submissions.
    #[error("coordinator is shutting down")]
    ShuttingDown,
}
