//! The unit of work the coordinator's FIFO worker loop processes.
//!
//! `submit`'s generic critical section is erased into a trait object here
//! so heterogeneous submissions can share one channel; `async fn` in a
//! trait isn't dyn-compatible, so [`Job::run`] returns a boxed future
//! directly, mirroring the dyn-compatible store traits in `txn-lss`.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;
use txn_core::{CoreError, FunctionalCore};
use txn_lss::LssWriter;

use crate::effect::EffectFanout;
use crate::error::CoordinatorError;
use crate::fatal::FatalHandler;
use crate::CoordinatorHandle;

pub(crate) struct JobContext<'a> {
    pub core: &'a mut FunctionalCore,
    pub writer: &'a dyn LssWriter,
    pub fatal: &'a dyn FatalHandler,
    pub effects: &'a EffectFanout,
    pub handle: CoordinatorHandle,
}

pub(crate) trait Job: Send {
    fn run<'a>(self: Box<Self>, ctx: JobContext<'a>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}

/// A critical section plus the channel its caller is waiting on.
pub(crate) struct TypedJob<T, F> {
    pub critical_section: F,
    pub respond: oneshot::Sender<Result<T, CoordinatorError>>,
}

impl<T, F> Job for TypedJob<T, F>
where
    T: Send + 'static,
    F: FnOnce(&mut FunctionalCore) -> Result<T, CoreError> + Send + 'static,
{
    fn run<'a>(self: Box<Self>, ctx: JobContext<'a>) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Self {
                critical_section,
                respond,
            } = *self;

            // Step 1-2: the job already sat in FIFO order to reach here.
            // Step 3: run the critical section against live projections.
            match critical_section(ctx.core) {
                // Step 4: roll back on in-memory failure, nothing durable happened.
                Err(err) => {
                    ctx.core.rollback();
                    metrics::counter!("coordinator.transactions.rolled_back").increment(1);
                    let _ = respond.send(Err(CoordinatorError::Core(err)));
                }
                Ok(value) => {
                    // Step 5: commit drains the buffered events for append.
                    let events = ctx.core.commit();
                    // Step 6: the only point in the critical path allowed to suspend.
                    match ctx.writer.physical_append(events).await {
                        // Step 7: a store that silently diverged from memory is fatal.
                        Err(err) => {
                            let reason = err.to_string();
                            metrics::counter!("coordinator.transactions.fatal").increment(1);
                            ctx.fatal.on_fatal(&reason);
                            let _ = respond.send(Err(CoordinatorError::Storage(reason)));
                        }
                        // Step 8: fan out post-commit effects and report success.
                        Ok(committed) => {
                            metrics::counter!("coordinator.transactions.committed").increment(1);
                            ctx.effects.dispatch(&committed, ctx.handle.clone());
                            let _ = respond.send(Ok(value));
                        }
                    }
                }
            }
        })
    }
}
