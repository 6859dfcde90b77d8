//! Type-erased projection state.
//!
//! [`ChangeState`](crate::ChangeState) and [`ViewState`](crate::ViewState)
//! entries are registered into the engine by `view_id` (a string), so the
//! engine holds them in a single heterogeneous table rather than as
//! statically-typed fields. Concrete applications still define real,
//! strongly-typed Rust structs per view (see the `ChangeState`/`ViewState`
//! doc examples) - `DynState` is just the object-safe seam that lets the
//! engine store, snapshot and query them without knowing their concrete type.

use std::any::Any;

/// A projection's in-memory state, made object-safe via `Any` so the engine
/// can hold heterogeneous projections in one `view_id`-keyed table.
///
/// Implemented automatically for any `Clone + Serialize` type; application
/// code never implements this by hand.
pub trait DynState: Send + Sync {
    /// Upcast to `Any` for downcasting back to the concrete state type.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast to `Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Deep-copy this state, boxed. Used for the pre-change snapshot taken
    /// lazily on first mutation within a transaction.
    fn clone_dyn(&self) -> Box<dyn DynState>;

    /// Render the current state as JSON, for `query(path)` path-walking.
    fn to_json(&self) -> serde_json::Value;
}

impl<S> DynState for S
where
    S: Any + Clone + serde::Serialize + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_dyn(&self) -> Box<dyn DynState> {
        Box::new(self.clone())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "projection state failed to serialize to JSON");
            serde_json::Value::Null
        })
    }
}

/// Downcast a `&dyn DynState` to a concrete state type.
///
/// # Panics
///
/// Panics if `S` is not the type the projection was registered with. This
/// indicates a programming error (a `ChangeState`/`ViewState`/`StateMachine`
/// entry downcasting the wrong `view_id`), not a runtime data problem.
#[must_use]
#[allow(clippy::panic)]
pub fn downcast_ref<S: Any>(state: &dyn DynState) -> &S {
    state
        .as_any()
        .downcast_ref::<S>()
        .unwrap_or_else(|| panic!("projection state is not of type {}", std::any::type_name::<S>()))
}

/// Mutable counterpart of [`downcast_ref`].
///
/// # Panics
///
/// Panics under the same condition as [`downcast_ref`].
#[must_use]
#[allow(clippy::panic)]
pub fn downcast_mut<S: Any>(state: &mut dyn DynState) -> &mut S {
    let type_name = std::any::type_name::<S>();
    state
        .as_any_mut()
        .downcast_mut::<S>()
        .unwrap_or_else(|| panic!("projection state is not of type {type_name}"))
}
