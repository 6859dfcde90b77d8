//! What happens when the LSS reports a storage error mid-transaction.
//!
//! A failed append leaves the in-memory projections ahead of durable
//! storage - the only safe response is to stop trusting the process's own
//! state. Production wires [`ProcessExitHandler`]; tests wire something
//! that records the failure instead of tearing down the test binary.

use std::sync::atomic::{AtomicBool, Ordering};

/// Reacts to a fatal storage error. Implementations are not expected to
/// return control to the caller in production; the trait returns `()`
/// rather than diverging (`!`) only so test doubles can observe the call.
pub trait FatalHandler: Send + Sync {
    /// Called once, from the coordinator's worker loop, when
    /// [`txn_lss::LssWriter::physical_append`] fails.
    fn on_fatal(&self, reason: &str);
}

/// The production handler: logs and exits the process immediately.
/// Exit code `1`, matching a generic unrecoverable-error convention.
#[derive(Debug, Default)]
pub struct ProcessExitHandler;

impl FatalHandler for ProcessExitHandler {
    fn on_fatal(&self, reason: &str) {
        tracing::error!(reason, "fatal storage error, exiting");
        std::process::exit(1);
    }
}

/// A test double that records whether it fired instead of exiting the
/// process, so coordinator tests can assert fatal behavior without killing
/// the test harness.
#[derive(Debug, Default)]
pub struct RecordingFatalHandler {
    fired: AtomicBool,
}

impl RecordingFatalHandler {
    /// Whether `on_fatal` has been called.
    #[must_use]
    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl FatalHandler for RecordingFatalHandler {
    fn on_fatal(&self, reason: &str) {
        tracing::error!(reason, "fatal storage error (recording handler, not exiting)");
        self.fired.store(true, Ordering::SeqCst);
    }
}
