//! Projection traits: [`ChangeState`], [`ViewState`], [`StateMachine`], and
//! the [`CoreAccess`] seam state machines use to react.

use crate::command::Command;
use crate::error::CoreError;
use crate::event::{Event, NewEvent};
use crate::state::DynState;

/// The result of [`CoreAccess::query`]: either the value found at the given
/// path, or an explicit absence. Distinct from `Option` so that the
/// "no such view" and "path walks off the structure" cases are both
/// representable without conflating them with a JSON `null` payload.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    /// A value was found at the given path.
    Found(serde_json::Value),
    /// No view, or no value at that path, exists.
    Absent,
}

impl QueryResult {
    /// True if this is [`QueryResult::Found`].
    #[must_use]
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The found value, or `None` if absent.
    #[must_use]
    pub fn into_value(self) -> Option<serde_json::Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent => None,
        }
    }
}

/// A projection consulted by [`ChangeState::map`] to decide what events a
/// command should emit.
///
/// `reduce` is the only place `ChangeState` state may be mutated, and it
/// must be a pure fold over the event: given the same starting state and
/// the same event, it must always make the same change. `map` must never
/// mutate state directly - any value a command needs to allocate (an id, a
/// sequence number) must be derived by folding the very events `map`
/// itself returns, so that replaying those events through `reduce`
/// reproduces the same state `map` observed.
pub trait ChangeState: Send + Sync {
    /// The stable identifier this projection is registered and queried
    /// under.
    fn view_id(&self) -> &'static str;

    /// The projection's state before any event has been folded into it.
    fn initial_state(&self) -> Box<dyn DynState>;

    /// Fold `event` into `state` if it is relevant to this projection.
    /// Returns `true` if `state` was modified.
    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool;

    /// Interpret `command` against the current `state`, returning the
    /// events it should produce. Must not mutate `state`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::MapperFailure`] if the command cannot be
    /// interpreted against the current state (e.g. a business rule
    /// violation). The caller rolls back the whole transaction.
    fn map(&self, command: &Command, state: &dyn DynState) -> Result<Vec<NewEvent>, CoreError>;
}

/// A projection consulted by queries and by [`StateMachine`] triggers, but
/// never by a mapper. Read-only from the outside; folded purely from
/// events, exactly like [`ChangeState`].
pub trait ViewState: Send + Sync {
    /// The stable identifier this projection is registered and queried
    /// under.
    fn view_id(&self) -> &'static str;

    /// The projection's state before any event has been folded into it.
    fn initial_state(&self) -> Box<dyn DynState>;

    /// Fold `event` into `state` if it is relevant to this projection.
    /// Returns `true` if `state` was modified.
    fn reduce(&self, state: &mut dyn DynState, event: &Event) -> bool;
}

/// The subset of [`crate::FunctionalCore`] a [`StateMachine`] is allowed to
/// use while reacting to a dirtied view: querying any projection, and
/// producing new commands. Abstracted behind a trait so state machines
/// never need a `&mut FunctionalCore` directly (which would make the
/// recursive fixpoint loop impossible to express under the borrow checker).
pub trait CoreAccess {
    /// Walk `path` into the named view's current state as JSON.
    fn query(&self, view_id: &str, path: &[&str]) -> QueryResult;

    /// Interpret and apply a command as part of the in-flight transaction,
    /// returning the events it produced.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError::UnknownCommand`] or
    /// [`CoreError::MapperFailure`] from the underlying `produce` call.
    fn produce(&mut self, command: Command) -> Result<Vec<NewEvent>, CoreError>;
}

/// A reactive rule: when the view named by [`StateMachine::trigger_view_id`]
/// is dirtied during a transaction, `trigger` runs once with access to the
/// rest of the engine. Triggers may themselves produce commands, which may
/// dirty further views and re-trigger state machines - the engine iterates
/// this to a fixpoint within a single transaction.
pub trait StateMachine: Send + Sync {
    /// The stable identifier of this state machine, for diagnostics.
    fn view_id(&self) -> &'static str;

    /// The `view_id` this state machine reacts to. When that view appears
    /// in the dirty set, `trigger` is invoked.
    fn trigger_view_id(&self) -> &'static str;

    /// React to the triggering view having changed.
    ///
    /// # Errors
    ///
    /// Propagates any [`CoreError`] raised by a `core.produce(..)` call
    /// made from within the trigger.
    fn trigger(&self, core: &mut dyn CoreAccess) -> Result<(), CoreError>;
}
