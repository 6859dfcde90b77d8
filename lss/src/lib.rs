//! # Log-Structured Store
//!
//! The durability seam: a single, globally-ordered, append-only log of
//! [`Event`](txn_core::Event)s, written by exactly one writer at a time.
//!
//! [`LssWriter`] and [`LssReader`] are split so that a process can hold a
//! writer handle (and thereby the single-writer exclusivity the whole
//! engine depends on) separately from however many reader handles it wants.
//! Implementations live in sibling crates (see `txn-lss-postgres`); this
//! crate is the storage-agnostic contract plus an in-memory reference.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use txn_core::{Event, NewEvent, OrderId, PartitionId};

/// Errors a log-structured store can raise.
#[derive(Debug, Error)]
pub enum LssError {
    /// `logical_read_first` or `logical_read_last` was called on a
    /// partition with no events.
    #[error("partition {0} has no events")]
    EmptyPartition(PartitionId),

    /// The underlying storage failed (connection lost, constraint
    /// violation, disk full, ...). Callers treat this as fatal: the
    /// process cannot continue operating against a store it cannot trust.
    #[error("storage error: {0}")]
    Storage(String),
}

/// A boxed future returned by the dyn-compatible `Lss*` trait methods.
/// `async fn` in a trait is not dyn-compatible, so implementors return this
/// directly instead.
pub type LssFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LssError>> + Send + 'a>>;

/// The single-writer append path. Only one live `LssWriter` for a given
/// store should exist at a time; holding that exclusivity is the caller's
/// responsibility (typically: the transaction coordinator owns the only
/// handle and never hands out a second one).
pub trait LssWriter: Send + Sync {
    /// Durably append `events`, in order, assigning each a fresh
    /// [`OrderId`] and stamping `append_time`. Either all events are
    /// appended or none are.
    fn physical_append<'a>(&'a self, events: Vec<NewEvent>) -> LssFuture<'a, Vec<Event>>;
}

/// Read access to the log. Any number of readers may coexist with the one
/// writer.
pub trait LssReader: Send + Sync {
    /// Read every event with `order_id >= from`, in ascending order. This
    /// is the recovery driver's only read path.
    fn physical_read<'a>(&'a self, from: OrderId) -> LssFuture<'a, Vec<Event>>;

    /// Read events in `partition_id`, ordered by `order_id` ascending if
    /// `asc` else descending, skipping `offset` matches and returning at
    /// most `limit` of them (`None` for no cap).
    fn logical_read<'a>(
        &'a self,
        partition_id: &'a PartitionId,
        asc: bool,
        limit: Option<u32>,
        offset: u32,
    ) -> LssFuture<'a, Vec<Event>>;

    /// Read the earliest event in `partition_id`.
    ///
    /// Resolves to [`LssError::EmptyPartition`] if the partition has no events.
    fn logical_read_first<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event>;

    /// Read the most recent event in `partition_id`.
    ///
    /// Resolves to [`LssError::EmptyPartition`] if the partition has no events.
    fn logical_read_last<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event>;
}
