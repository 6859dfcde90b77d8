//! The FIFO serializing worker: the only thing allowed to mutate
//! [`FunctionalCore`] after recovery has completed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use txn_core::{CoreError, FunctionalCore};
use txn_lss::LssWriter;

use crate::effect::EffectFanout;
use crate::error::CoordinatorError;
use crate::fatal::FatalHandler;
use crate::job::{Job, JobContext, TypedJob};

/// A cheaply-cloneable submission handle. Any number of callers - command
/// handlers, state machines running inside other transactions via their
/// own coordinator, effect callbacks - can hold one and call
/// [`CoordinatorHandle::submit`] concurrently; submissions still serialize
/// through the single worker loop.
#[derive(Clone)]
pub struct CoordinatorHandle {
    jobs: mpsc::UnboundedSender<Box<dyn Job>>,
}

impl CoordinatorHandle {
    /// Submit a critical section to run against the live [`FunctionalCore`],
    /// in FIFO order with every other submission. Resolves once the
    /// resulting events (if any) are durable.
    ///
    /// The critical section must be synchronous and side-effect-free
    /// beyond calls to `core.produce`/`core.consume`/`core.query` - it may
    /// run again in full if the coordinator is retried at a layer above
    /// this one, and it must not itself talk to storage or the network.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Core`] if the critical section failed
    /// (the transaction was rolled back), [`CoordinatorError::Storage`] if
    /// the durable append failed (fatal - the process is already exiting
    /// by the time this returns in production), or
    /// [`CoordinatorError::ShuttingDown`] if the worker loop is gone.
    pub async fn submit<T, F>(&self, critical_section: F) -> Result<T, CoordinatorError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FunctionalCore) -> Result<T, CoreError> + Send + 'static,
    {
        let (respond, receiver) = oneshot::channel();
        let job = Box::new(TypedJob {
            critical_section,
            respond,
        });
        self.jobs
            .send(job)
            .map_err(|_| CoordinatorError::ShuttingDown)?;
        receiver.await.map_err(|_| CoordinatorError::ShuttingDown)?
    }
}

/// Owns the live [`FunctionalCore`] and the single LSS writer handle, and
/// drains submissions one at a time. Construct with [`Coordinator::new`]
/// and drive with [`Coordinator::run`], typically on its own `tokio::spawn`.
pub struct Coordinator {
    core: FunctionalCore,
    writer: Box<dyn LssWriter>,
    fatal: Arc<dyn FatalHandler>,
    effects: EffectFanout,
    jobs: mpsc::UnboundedReceiver<Box<dyn Job>>,
    // A *weak* sender: effects and recursive submissions need a handle to
    // hand out, but if this were a strong clone the coordinator would hold
    // its own channel open forever and `run` could never observe "every
    // caller's handle has been dropped".
    weak_handle: mpsc::WeakUnboundedSender<Box<dyn Job>>,
}

impl Coordinator {
    /// Build a coordinator around an already-recovered [`FunctionalCore`].
    /// Returns the coordinator (to be `run`) and a handle callers use to
    /// submit work.
    #[must_use]
    pub fn new(
        core: FunctionalCore,
        writer: Box<dyn LssWriter>,
        fatal: Arc<dyn FatalHandler>,
        effects: EffectFanout,
    ) -> (Self, CoordinatorHandle) {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let weak_handle = jobs_tx.downgrade();
        let handle = CoordinatorHandle { jobs: jobs_tx };
        (
            Self {
                core,
                writer,
                fatal,
                effects,
                jobs: jobs_rx,
                weak_handle,
            },
            handle,
        )
    }

    /// Drain submissions until every [`CoordinatorHandle`] has been
    /// dropped. Never returns early on an in-memory or storage error - it
    /// only stops when there is no one left to submit work.
    #[tracing::instrument(skip(self), name = "coordinator.run")]
    pub async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            // `recv` just returned a job, so a strong sender existed a
            // moment ago; if every external handle has since raced to
            // drop, fall back to an already-closed handle rather than
            // panicking - any submission through it will see `ShuttingDown`.
            let handle = self.weak_handle.upgrade().map_or_else(closed_handle, |jobs| CoordinatorHandle { jobs });
            let ctx = JobContext {
                core: &mut self.core,
                writer: self.writer.as_ref(),
                fatal: self.fatal.as_ref(),
                effects: &self.effects,
                handle,
            };
            job.run(ctx).await;
        }
        tracing::info!("coordinator stopped: no submission handles remain");
    }
}

/// A [`CoordinatorHandle`] whose receiver is already gone - any `submit`
/// against it resolves immediately with `ShuttingDown`.
fn closed_handle() -> CoordinatorHandle {
    let (jobs, _receiver_dropped_immediately) = mpsc::unbounded_channel();
    CoordinatorHandle { jobs }
}
