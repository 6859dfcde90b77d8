//! # Transaction Coordinator
//!
//! Serializes every command and effect callback into a single FIFO stream
//! against one live [`txn_core::FunctionalCore`], appends the resulting
//! events through a [`txn_lss::LssWriter`], and fans out post-commit
//! effects. Also owns recovery: replaying the durable log back into a
//! fresh `FunctionalCore` on startup.
//!
//! ## The `submit` protocol
//!
//! 1. A caller builds a critical section (a closure running
//!    `core.produce`/`core.consume`/`core.query`) and calls
//!    [`CoordinatorHandle::submit`].
//! 2. The submission joins the FIFO queue and waits its turn.
//! 3. The worker loop runs the critical section against the live core.
//! 4. On in-memory failure, the core is rolled back and the caller sees
//!    the error; nothing was appended.
//! 5. On success, `core.commit()` drains the transaction's buffered events.
//! 6. The events are appended to the LSS - the only storage I/O on this
//!    path, and the only point allowed to suspend besides step 8.
//! 7. A failed append is treated as fatal: the configured
//!    [`FatalHandler`] fires, because in-memory state has now diverged
//!    from what is durable.
//! 8. On success, matching [`EffectCallback`]s are spawned (not awaited)
//!    against the committed events, and the caller's result is returned.

mod coordinator;
mod effect;
mod error;
mod fatal;
mod job;
mod recovery;

pub use coordinator::{Coordinator, CoordinatorHandle};
pub use effect::{EffectCallback, EffectFanout};
pub use error::CoordinatorError;
pub use fatal::{FatalHandler, ProcessExitHandler, RecordingFatalHandler};
pub use recovery::recover;
