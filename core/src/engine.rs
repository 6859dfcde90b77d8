//! [`FunctionalCore`]: the pure, synchronous interpreter at the center of
//! the engine.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::command::Command;
use crate::error::CoreError;
use crate::event::{Event, EventMetadata, NewEvent, OrderId};
use crate::projection::{ChangeState, CoreAccess, QueryResult, StateMachine, ViewState};
use crate::state::DynState;

/// Hard cap on state-machine fixpoint recursion. A state machine that
/// re-triggers itself (directly, or through a cycle with other state
/// machines) without ever reaching a quiescent dirty set hits this instead
/// of recursing forever.
const MAX_RECURSION_DEPTH: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum Registry {
    Change,
    View,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct SnapshotKey(Registry, &'static str);

/// Builds a [`FunctionalCore`] from its registered projections and state
/// machines. Registration order does not affect behavior.
#[derive(Default)]
pub struct FunctionalCoreBuilder {
    change_states: Vec<Box<dyn ChangeState>>,
    view_states: Vec<Box<dyn ViewState>>,
    state_machines: Vec<Box<dyn StateMachine>>,
}

impl FunctionalCoreBuilder {
    /// Start an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`ChangeState`] entry.
    #[must_use]
    pub fn with_change_state(mut self, change_state: Box<dyn ChangeState>) -> Self {
        self.change_states.push(change_state);
        self
    }

    /// Register a [`ViewState`] entry.
    #[must_use]
    pub fn with_view_state(mut self, view_state: Box<dyn ViewState>) -> Self {
        self.view_states.push(view_state);
        self
    }

    /// Register a [`StateMachine`].
    #[must_use]
    pub fn with_state_machine(mut self, state_machine: Box<dyn StateMachine>) -> Self {
        self.state_machines.push(state_machine);
        self
    }

    /// Finalize the engine, materializing every projection's initial state.
    #[must_use]
    pub fn build(self) -> FunctionalCore {
        let mut change_state_data = HashMap::with_capacity(self.change_states.len());
        let mut change_states = HashMap::with_capacity(self.change_states.len());
        for cs in self.change_states {
            let view_id = cs.view_id();
            change_state_data.insert(view_id, cs.initial_state());
            change_states.insert(view_id, cs);
        }

        let mut view_state_data = HashMap::with_capacity(self.view_states.len());
        let mut view_states = HashMap::with_capacity(self.view_states.len());
        for vs in self.view_states {
            let view_id = vs.view_id();
            view_state_data.insert(view_id, vs.initial_state());
            view_states.insert(view_id, vs);
        }

        FunctionalCore {
            change_states,
            view_states,
            state_machines: Arc::new(self.state_machines),
            change_state_data,
            view_state_data,
            tx_buffer: Vec::new(),
            pre_change_snapshots: HashMap::new(),
            dirty_views: HashSet::new(),
        }
    }
}

/// The functional core: owns every projection, interprets commands, folds
/// events, and drives the state-machine fixpoint. Storage-free - the LSS
/// and the transaction coordinator live around it, not in it.
pub struct FunctionalCore {
    change_states: HashMap<&'static str, Box<dyn ChangeState>>,
    view_states: HashMap<&'static str, Box<dyn ViewState>>,
    // Arc'd so a state machine's `trigger` can recursively call back into
    // `produce`, which needs its own handle to the state machine list,
    // without borrowing `self.state_machines` for the outer iteration.
    state_machines: Arc<Vec<Box<dyn StateMachine>>>,
    change_state_data: HashMap<&'static str, Box<dyn DynState>>,
    view_state_data: HashMap<&'static str, Box<dyn DynState>>,
    tx_buffer: Vec<NewEvent>,
    pre_change_snapshots: HashMap<SnapshotKey, Box<dyn DynState>>,
    dirty_views: HashSet<&'static str>,
}

impl FunctionalCore {
    /// Start building a core from its projections and state machines.
    #[must_use]
    pub fn builder() -> FunctionalCoreBuilder {
        FunctionalCoreBuilder::new()
    }

    /// Interpret `command` through its registered [`ChangeState`] mapper,
    /// fold the resulting events into every projection, and run the
    /// state-machine fixpoint. Buffers the events for the in-flight
    /// transaction; does not touch durable storage.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCommand`] if no `ChangeState` is
    /// registered under `command.command_type`, or propagates whatever
    /// error the mapper or a triggered state machine raised.
    #[tracing::instrument(skip(self, command), fields(command_type = %command.command_type))]
    pub fn produce(&mut self, command: Command) -> Result<Vec<NewEvent>, CoreError> {
        self.produce_inner(command, 0)
    }

    /// Fold already-decided events into every projection and run the
    /// state-machine fixpoint, without going through a mapper. Used for
    /// events that originate outside a command (e.g. the LSS bootstrap
    /// record arriving via a caller that wants it folded like any other
    /// append).
    ///
    /// # Errors
    ///
    /// Propagates any error a triggered state machine raised.
    pub fn consume(&mut self, events: Vec<NewEvent>) -> Result<(), CoreError> {
        self.consume_inner(events, 0)
    }

    /// Walk `path` into the named projection's current state.
    #[must_use]
    pub fn query(&self, view_id: &str, path: &[&str]) -> QueryResult {
        let Some(state) = self
            .view_state_data
            .get(view_id)
            .or_else(|| self.change_state_data.get(view_id))
        else {
            return QueryResult::Absent;
        };

        let mut value = state.to_json();
        for segment in path {
            let serde_json::Value::Object(mut object) = value else {
                return QueryResult::Absent;
            };
            match object.remove(*segment) {
                Some(next) => value = next,
                None => return QueryResult::Absent,
            }
        }
        QueryResult::Found(value)
    }

    /// A registered projection's current state as JSON, for diagnostics
    /// and tests. `None` if no projection is registered under `view_id`.
    #[must_use]
    pub fn projection_json(&self, view_id: &str) -> Option<serde_json::Value> {
        self.view_state_data
            .get(view_id)
            .or_else(|| self.change_state_data.get(view_id))
            .map(|state| state.to_json())
    }

    /// Fold a single already-durable [`Event`] into every projection. Pure:
    /// never produces commands, never runs state machines. This is the
    /// only operation [`crate::FunctionalCore`] performs during recovery.
    pub fn reduce(&mut self, event: &Event) {
        for (&view_id, change_state) in &self.change_states {
            let Some(state) = self.change_state_data.get_mut(view_id) else {
                continue;
            };
            Self::snapshot_if_needed(
                &mut self.pre_change_snapshots,
                SnapshotKey(Registry::Change, view_id),
                state.as_ref(),
            );
            if change_state.reduce(state.as_mut(), event) {
                self.dirty_views.insert(view_id);
            }
        }

        for (&view_id, view_state) in &self.view_states {
            let Some(state) = self.view_state_data.get_mut(view_id) else {
                continue;
            };
            Self::snapshot_if_needed(
                &mut self.pre_change_snapshots,
                SnapshotKey(Registry::View, view_id),
                state.as_ref(),
            );
            if view_state.reduce(state.as_mut(), event) {
                self.dirty_views.insert(view_id);
            }
        }
    }

    fn snapshot_if_needed(
        snapshots: &mut HashMap<SnapshotKey, Box<dyn DynState>>,
        key: SnapshotKey,
        current: &dyn DynState,
    ) {
        snapshots
            .entry(key)
            .or_insert_with(|| current.clone_dyn());
    }

    /// End the in-flight transaction successfully: clears rollback
    /// bookkeeping and returns the buffered events, in emission order, for
    /// the caller to append to the LSS.
    pub fn commit(&mut self) -> Vec<NewEvent> {
        self.pre_change_snapshots.clear();
        self.dirty_views.clear();
        std::mem::take(&mut self.tx_buffer)
    }

    /// Abort the in-flight transaction: restores every projection touched
    /// since the last commit to its pre-transaction value and discards the
    /// buffered events. Idempotent.
    pub fn rollback(&mut self) {
        for (key, snapshot) in self.pre_change_snapshots.drain() {
            let SnapshotKey(registry, view_id) = key;
            match registry {
                Registry::Change => {
                    self.change_state_data.insert(view_id, snapshot);
                }
                Registry::View => {
                    self.view_state_data.insert(view_id, snapshot);
                }
            }
        }
        self.dirty_views.clear();
        self.tx_buffer.clear();
    }

    /// Clear transaction bookkeeping without restoring projections.
    ///
    /// Recovery folds already-durable events straight into live state via
    /// [`FunctionalCore::reduce`]; there is nothing to roll back to, and
    /// calling [`FunctionalCore::rollback`] at the end of replay would
    /// incorrectly undo it. This is the recovery driver's end-of-replay
    /// cleanup instead.
    pub fn discard_transaction_bookkeeping(&mut self) {
        self.pre_change_snapshots.clear();
        self.dirty_views.clear();
        self.tx_buffer.clear();
    }

    fn produce_inner(&mut self, command: Command, depth: usize) -> Result<Vec<NewEvent>, CoreError> {
        let view_id = *self
            .change_states
            .get_key_value(command.command_type.as_str())
            .map(|(view_id, _)| view_id)
            .ok_or_else(|| CoreError::UnknownCommand(command.command_type.clone()))?;

        Self::snapshot_if_needed(
            &mut self.pre_change_snapshots,
            SnapshotKey(Registry::Change, view_id),
            self.change_state_data[view_id].as_ref(),
        );

        let events = {
            let mapper = &self.change_states[view_id];
            let state = self.change_state_data[view_id].as_ref();
            mapper.map(&command, state)?
        };

        self.consume_inner(events.clone(), depth)?;
        Ok(events)
    }

    fn consume_inner(&mut self, events: Vec<NewEvent>, depth: usize) -> Result<(), CoreError> {
        for event in &events {
            let pending = Event {
                order_id: OrderId::BOOTSTRAP,
                partition_id: event.partition_id.clone(),
                event_type: event.event_type.clone(),
                data: event.data.clone(),
                metadata: EventMetadata {
                    append_time: event.metadata.append_time,
                    extra: event.metadata.extra.clone(),
                },
            };
            self.reduce(&pending);
        }
        self.tx_buffer.extend(events);
        self.run_state_machines(depth)
    }

    fn run_state_machines(&mut self, depth: usize) -> Result<(), CoreError> {
        if self.dirty_views.is_empty() {
            return Ok(());
        }
        if depth >= MAX_RECURSION_DEPTH {
            return Err(CoreError::RecursionLimitExceeded {
                limit: MAX_RECURSION_DEPTH,
            });
        }

        let dirty = std::mem::take(&mut self.dirty_views);
        let state_machines = Arc::clone(&self.state_machines);
        for state_machine in state_machines.iter() {
            if dirty.contains(state_machine.trigger_view_id()) {
                let mut accessor = CoreAccessor {
                    core: self,
                    depth: depth + 1,
                };
                state_machine.trigger(&mut accessor)?;
            }
        }

        // Triggers above only ever mutate state through `CoreAccess::produce`,
        // which resolves its own fixpoint recursively before returning. This
        // call catches any dirt left over from that, and is a no-op once the
        // whole transaction is quiescent.
        self.run_state_machines(depth + 1)
    }
}

struct CoreAccessor<'a> {
    core: &'a mut FunctionalCore,
    depth: usize,
}

impl CoreAccess for CoreAccessor<'_> {
    fn query(&self, view_id: &str, path: &[&str]) -> QueryResult {
        self.core.query(view_id, path)
    }

    fn produce(&mut self, command: Command) -> Result<Vec<NewEvent>, CoreError> {
        self.core.produce_inner(command, self.depth)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use proptest::prelude::*;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::state::downcast_mut;

    /// `Counter.Add`: adds `amount` to a running total. The smallest
    /// possible `ChangeState`, used only to drive these engine-level tests.
    #[derive(Clone, Debug, Default, Serialize, Deserialize)]
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

    fn core_with_counter() -> FunctionalCore {
        FunctionalCore::builder().with_change_state(Box::new(CounterAdd)).build()
    }

    fn replay(amounts: &[i64]) -> serde_json::Value {
        let mut core = core_with_counter();
        for &amount in amounts {
            core.produce(Command::new("Counter.Add", serde_json::json!({ "amount": amount })))
                .unwrap();
            core.commit();
        }
        let QueryResult::Found(total) = core.query("Counter.Add", &["total"]) else {
            panic!("Counter.Add state missing");
        };
        total
    }

    proptest! {
        /// Testable property 1: replaying the same ordered sequence of
        /// commands through two independently-built cores always reaches
        /// identical projection state.
        #[test]
        fn replaying_the_same_commands_is_deterministic(amounts in proptest::collection::vec(-1000i64..1000, 0..50)) {
            prop_assert_eq!(replay(&amounts), replay(&amounts));
        }
    }

    /// Testable property 5: `commit` immediately followed by another
    /// `commit`, with no intervening `produce`/`consume`, returns an empty
    /// event list - there is nothing left buffered.
    #[test]
    fn commit_after_commit_is_empty() {
        let mut core = core_with_counter();
        core.produce(Command::new("Counter.Add", serde_json::json!({ "amount": 1 })))
            .unwrap();
        let first = core.commit();
        assert_eq!(first.len(), 1);
        let second = core.commit();
        assert!(second.is_empty());
    }

    /// Testable property 6: `query` returns `Absent` whenever some prefix
    /// of the path doesn't exist, whether the view itself is unregistered
    /// or the path just walks off the structure.
    #[test]
    fn query_is_absent_for_missing_path_prefixes() {
        let core = core_with_counter();
        assert_eq!(core.query("No.Such.View", &[]), QueryResult::Absent);
        assert_eq!(core.query("Counter.Add", &["nonexistent"]), QueryResult::Absent);

        let QueryResult::Found(total) = core.query("Counter.Add", &["total"]) else {
            panic!("Counter.Add/total should be found");
        };
        assert_eq!(total, serde_json::json!(0));
    }

    /// `QueryResult::is_found`/`into_value` are the ergonomic accessors
    /// callers outside this crate use instead of matching the enum by hand.
    #[test]
    fn query_result_accessors() {
        let found = QueryResult::Found(serde_json::json!(42));
        assert!(found.is_found());
        assert_eq!(found.into_value(), Some(serde_json::json!(42)));

        let absent = QueryResult::Absent;
        assert!(!absent.is_found());
        assert_eq!(absent.into_value(), None);
    }
}
