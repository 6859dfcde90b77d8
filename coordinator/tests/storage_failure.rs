//! S5: a storage failure mid-transaction is fatal - the configured
//! `FatalHandler` fires and the caller sees `CoordinatorError::Storage` -
//! and a subsequent restart recovers every transaction that actually made
//! it to durable storage before the failing one.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use txn_core::{downcast_mut, ChangeState, Command, CoreError, DynState, Event, FunctionalCore, NewEvent, QueryResult};
use txn_coordinator::{recover, Coordinator, CoordinatorError, EffectFanout, FatalHandler, RecordingFatalHandler};
use txn_lss::{LssError, LssFuture, LssReader, LssWriter};
use txn_testing::InMemoryLss;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
struct CounterState {
    total: i64,
}

struct CounterAdd;

impl ChangeState for CounterAdd {
    fn view_id(&self) -> &'static str {
        "Counter.Add"
    }

    fn initial_state(&self) -> Box<dyn DynState> {
        Box::new(CounterState::default())
    }

    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool {
        if event.event_type != "Counter.Added" {
            return false;
        }
        let Some(amount) = event.data.get("amount").and_then(serde_json::Value::as_i64) else {
            return false;
        };
        downcast_mut::<CounterState>(state).total += amount;
        true
    }

    fn map(&self, command: &Command, _state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError> {
        let amount = command.data.get("amount").and_then(serde_json::Value::as_i64).unwrap_or(0);
        Ok(vec![NewEvent::new(
            "counters",
            "Counter.Added",
            serde_json::json!({ "amount": amount }),
        )])
    }
}

fn core() -> FunctionalCore {
    FunctionalCore::builder().with_change_state(Box::new(CounterAdd)).build()
}

/// Wraps an [`InMemoryLss`], failing every `physical_append` once a flag is
/// set - simulating storage going away mid-run without needing a real
/// database.
struct FlakyLss {
    inner: InMemoryLss,
    fail_appends: AtomicBool,
}

impl FlakyLss {
    fn new() -> Self {
        Self {
            inner: InMemoryLss::new(),
            fail_appends: AtomicBool::new(false),
        }
    }

    fn start_failing(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }
}

impl LssWriter for FlakyLss {
    fn physical_append<'a>(&'a self, new_events: Vec<NewEvent>) -> LssFuture<'a, Vec<Event>> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Box::pin(async { Err(LssError::Storage("disk full".to_string())) });
        }
        self.inner.physical_append(new_events)
    }
}

impl LssReader for FlakyLss {
    fn physical_read<'a>(&'a self, from: txn_core::OrderId) -> LssFuture<'a, Vec<Event>> {
        self.inner.physical_read(from)
    }

    fn logical_read<'a>(
        &'a self,
        partition_id: &'a txn_core::PartitionId,
        asc: bool,
        limit: Option<u32>,
        offset: u32,
    ) -> LssFuture<'a, Vec<Event>> {
        self.inner.logical_read(partition_id, asc, limit, offset)
    }

    fn logical_read_first<'a>(&'a self, partition_id: &'a txn_core::PartitionId) -> LssFuture<'a, Event> {
        self.inner.logical_read_first(partition_id)
    }

    fn logical_read_last<'a>(&'a self, partition_id: &'a txn_core::PartitionId) -> LssFuture<'a, Event> {
        self.inner.logical_read_last(partition_id)
    }
}

#[tokio::test]
async fn storage_failure_is_fatal_and_restart_recovers_prior_commits() {
    let lss = Arc::new(FlakyLss::new());
    let fatal = Arc::new(RecordingFatalHandler::default());

    let mut recovered_start = core();
    recover(&mut recovered_start, lss.as_ref()).await.unwrap();

    let (coordinator, handle) = Coordinator::new(
        recovered_start,
        Box::new(DelegatingWriter(Arc::clone(&lss))),
        Arc::clone(&fatal) as Arc<dyn FatalHandler>,
        EffectFanout::empty(),
    );
    let run = tokio::spawn(coordinator.run());

    handle
        .submit(|core| core.produce(Command::new("Counter.Add", serde_json::json!({ "amount": 5 }))))
        .await
        .unwrap();

    lss.start_failing();

    let result = handle
        .submit(|core| core.produce(Command::new("Counter.Add", serde_json::json!({ "amount": 1 }))))
        .await;
    assert!(matches!(result, Err(CoordinatorError::Storage(_))));
    assert!(fatal.fired(), "fatal handler should have fired on storage failure");

    drop(handle);
    run.await.unwrap();

    // Restart: a fresh core recovered from the same durable log only sees
    // the transaction that made it to storage before the failure.
    let mut restarted = core();
    recover(&mut restarted, lss.as_ref()).await.unwrap();
    let QueryResult::Found(total) = restarted.query("Counter.Add", &["total"]) else {
        panic!("Counter.Add missing after restart");
    };
    assert_eq!(total, serde_json::json!(5));
}

/// `Coordinator::new` takes ownership of a boxed writer, but the test also
/// needs a shared handle to flip `start_failing` after the coordinator has
/// already been constructed - hence this thin `Arc` pass-through.
struct DelegatingWriter(Arc<FlakyLss>);

impl LssWriter for DelegatingWriter {
    fn physical_append<'a>(&'a self, new_events: Vec<NewEvent>) -> LssFuture<'a, Vec<Event>> {
        self.0.physical_append(new_events)
    }
}
