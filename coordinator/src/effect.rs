//! Post-commit effect fan-out.
//!
//! Runs outside the FIFO critical path: once a transaction's events are
//! durable, matching callbacks are spawned concurrently rather than
//! awaited in line, so a slow or failing outbound effect (an email send, a
//! webhook) never blocks the next transaction. Effects are at-least-once -
//! callbacks are responsible for their own retry bookkeeping, typically by
//! submitting a command that records an attempt in a view like
//! `Emails.To.Send`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use txn_core::Event;

use crate::CoordinatorHandle;

/// A post-commit side effect triggered by matching events.
pub trait EffectCallback: Send + Sync {
    /// Whether this callback should run for `event`.
    fn matches(&self, event: &Event) -> bool;

    /// Run the effect. Given a handle back into the coordinator so the
    /// callback can submit follow-up commands (e.g. to record a delivery
    /// attempt or outcome).
    fn handle<'a>(
        &'a self,
        event: Event,
        coordinator: CoordinatorHandle,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// The registry of effect callbacks a coordinator dispatches committed
/// events through.
#[derive(Clone, Default)]
pub struct EffectFanout {
    callbacks: Arc<Vec<Arc<dyn EffectCallback>>>,
}

impl EffectFanout {
    /// Build a fan-out from its callbacks.
    #[must_use]
    pub fn new(callbacks: Vec<Arc<dyn EffectCallback>>) -> Self {
        Self {
            callbacks: Arc::new(callbacks),
        }
    }

    /// No callbacks registered.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn dispatch(&self, events: &[Event], handle: CoordinatorHandle) {
        for event in events {
            for callback in self.callbacks.iter() {
                if !callback.matches(event) {
                    continue;
                }
                let callback = Arc::clone(callback);
                let event = event.clone();
                let handle = handle.clone();
                tokio::spawn(async move {
                    callback.handle(event, handle).await;
                });
            }
        }
    }
}
