//! S2: recovery determinism. Folding the same durable log into two
//! independently-built `FunctionalCore`s must produce identical projection
//! state, and recovery itself must never issue commands or run state
//! machines - only `reduce`.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use txn_core::{downcast_mut, ChangeState, Command, CoreError, DynState, Event, FunctionalCore, NewEvent, QueryResult};
use txn_coordinator::recover;
use txn_testing::InMemoryLss;

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
struct CounterState {
    total: i64,
}

/// `Counter.Add`: adds `amount` to a running total. Exists only so this
/// test has a command to drive - not part of the engine's own domain.
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

#[tokio::test]
async fn recovery_reproduces_the_same_state_as_the_live_run() {
    let lss = Arc::new(InMemoryLss::new());

    let mut live = core();
    for amount in [1, 2, 3] {
        live.produce(Command::new("Counter.Add", serde_json::json!({ "amount": amount })))
            .unwrap();
        let events = live.commit();
        txn_lss::LssWriter::physical_append(lss.as_ref(), events).await.unwrap();
    }

    let mut recovered = core();
    recover(&mut recovered, lss.as_ref()).await.unwrap();

    let QueryResult::Found(live_total) = live.query("Counter.Add", &["total"]) else {
        panic!("live core missing Counter.Add state");
    };
    let QueryResult::Found(recovered_total) = recovered.query("Counter.Add", &["total"]) else {
        panic!("recovered core missing Counter.Add state");
    };
    assert_eq!(live_total, recovered_total);
    assert_eq!(recovered_total, serde_json::json!(6));
}

#[tokio::test]
async fn recovering_twice_from_the_same_log_is_deterministic() {
    let lss = Arc::new(InMemoryLss::new());
    let mut seed = core();
    for amount in [10, -3, 7] {
        seed.produce(Command::new("Counter.Add", serde_json::json!({ "amount": amount })))
            .unwrap();
        let events = seed.commit();
        txn_lss::LssWriter::physical_append(lss.as_ref(), events).await.unwrap();
    }

    let mut first = core();
    recover(&mut first, lss.as_ref()).await.unwrap();
    let mut second = core();
    recover(&mut second, lss.as_ref()).await.unwrap();

    assert_eq!(first.query("Counter.Add", &["total"]), second.query("Counter.Add", &["total"]));
}
