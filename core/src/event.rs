//! Event identity and shape: the unit of durable fact.
//!
//! Mirrors the wire shape in section 6 of the specification:
//! `lss(order_id int64, partition_id string<=255, type string<=255, data json, metadata json)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length, in bytes, of a `partition_id` or `type` string.
pub const MAX_TAG_LEN: usize = 255;

/// Monotonically increasing, globally unique order assigned by the LSS writer
/// at append time. Strictly increasing in append order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(i64);

impl OrderId {
    /// The order id of the bootstrap `LSS.Initialized` record.
    pub const BOOTSTRAP: Self = Self(0);

    /// Wrap a raw order id, as read back from storage.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The underlying integer value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The next order id after this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OrderId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<OrderId> for i64 {
    fn from(id: OrderId) -> Self {
        id.0
    }
}

/// Opaque grouping key. Events sharing a `PartitionId`, ordered by
/// [`OrderId`], reflect causal order within that partition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    /// The partition used for engine bookkeeping records (e.g. the bootstrap event).
    pub const SYSTEM: &'static str = "system";

    /// Create a new partition id from anything string-like.
    ///
    /// # Panics
    ///
    /// Panics if `id` exceeds [`MAX_TAG_LEN`] bytes. Partition ids are
    /// constructed from application-controlled data, never raw external
    /// input, so this is treated as a programmer error rather than a
    /// recoverable one.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        assert!(
            id.len() <= MAX_TAG_LEN,
            "partition id exceeds {MAX_TAG_LEN} bytes: {id}"
        );
        Self(id)
    }

    /// Borrow the partition id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PartitionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PartitionId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Metadata stamped onto an event. The writer is required to stamp
/// `append_time`; everything else is caller-supplied context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// When the LSS writer durably appended this event. `None` until the
    /// writer stamps it; always `Some` on persisted events.
    pub append_time: Option<DateTime<Utc>>,

    /// Free-form additional metadata (correlation id, causation id, actor, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    /// Empty metadata, as used for locally-constructed events before append.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// An event before it has been durably appended: no `order_id`, no stamped
/// `append_time`. This is the shape produced by [`crate::ChangeState::map`],
/// held in the transaction buffer, and handed to the LSS writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Which partition this event belongs to.
    pub partition_id: PartitionId,
    /// Closed-vocabulary type tag, e.g. `"Subscription.Created"`.
    pub event_type: String,
    /// Structured payload, schema-per-type.
    pub data: serde_json::Value,
    /// Caller-supplied metadata; `append_time` is filled in by the writer.
    pub metadata: EventMetadata,
}

impl NewEvent {
    /// Construct a new event with empty metadata.
    #[must_use]
    pub fn new(
        partition_id: impl Into<PartitionId>,
        event_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            partition_id: partition_id.into(),
            event_type: event_type.into(),
            data,
            metadata: EventMetadata::empty(),
        }
    }
}

/// A durably-appended event: a [`NewEvent`] plus the [`OrderId`] and
/// `append_time` assigned atomically by the LSS writer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the LSS writer at append time. Strictly increasing, unique.
    pub order_id: OrderId,
    /// Which partition this event belongs to.
    pub partition_id: PartitionId,
    /// Closed-vocabulary type tag.
    pub event_type: String,
    /// Structured payload, schema-per-type.
    pub data: serde_json::Value,
    /// Metadata, with `append_time` always set.
    pub metadata: EventMetadata,
}

impl Event {
    /// The `(0, "system", "LSS.Initialized", {}, {})` record every store
    /// seeds on first initialization.
    #[must_use]
    pub fn bootstrap(append_time: DateTime<Utc>) -> Self {
        Self {
            order_id: OrderId::BOOTSTRAP,
            partition_id: PartitionId::new(PartitionId::SYSTEM),
            event_type: "LSS.Initialized".to_string(),
            data: serde_json::json!({}),
            metadata: EventMetadata {
                append_time: Some(append_time),
                extra: serde_json::Map::new(),
            },
        }
    }
}
