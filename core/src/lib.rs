//! # Transaction Engine Core
//!
//! The functional core of an event-sourced command-processing engine.
//!
//! This crate is deliberately storage-free and I/O-free: it owns the pure,
//! synchronous, in-memory interpreter that turns commands into events,
//! folds events into projections, and reactively dispatches follow-up
//! commands from state machines. Durability (the log-structured store) and
//! scheduling (the transaction coordinator) live in sibling crates.
//!
//! ## Core Concepts
//!
//! - [`Event`] / [`NewEvent`]: immutable facts, the unit of durable truth.
//! - [`Command`]: an in-memory request interpreted by a [`ChangeState`] mapper.
//! - [`ChangeState`]: a projection consulted by mappers to decide what to emit.
//! - [`ViewState`]: a projection consulted by queries and state machines.
//! - [`StateMachine`]: a reactive rule triggered when a named view is dirtied.
//! - [`FunctionalCore`]: the engine that owns every projection and exposes
//!   `produce` / `consume` / `query` / `commit` / `rollback` / `reduce`.
//!
//! ## Determinism contract
//!
//! Given the same initial projections and the same ordered sequence of
//! `produce`/`consume` inputs, [`FunctionalCore`] emits identical events and
//! reaches identical projections on every process. This is what makes
//! [`FunctionalCore::reduce`]-only replay (recovery) a sound way to rebuild
//! state after a restart.

mod command;
mod engine;
mod error;
mod event;
mod projection;
mod state;

pub use command::Command;
pub use engine::FunctionalCore;
pub use error::CoreError;
pub use event::{Event, EventMetadata, NewEvent, OrderId, PartitionId};
pub use projection::{ChangeState, CoreAccess, QueryResult, StateMachine, ViewState};
pub use state::{downcast_mut, downcast_ref, DynState};
