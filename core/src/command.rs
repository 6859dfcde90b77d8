//! Command: an in-memory request interpreted by a [`crate::ChangeState`] mapper.

use serde::{Deserialize, Serialize};

/// A request to change state. Commands are never persisted directly; they
/// are reified as whatever events their mapper yields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Command {
    /// Names the [`crate::ChangeState`] entry (its `view_id`) that should
    /// interpret this command.
    pub command_type: String,
    /// Command payload, schema-per-type.
    pub data: serde_json::Value,
}

impl Command {
    /// Construct a new command.
    #[must_use]
    pub fn new(command_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            command_type: command_type.into(),
            data,
        }
    }
}
