//! An in-memory [`LssWriter`] / [`LssReader`], for unit and property tests
//! that need a real store without a database.

use std::sync::Arc;

use tokio::sync::Mutex;
use txn_core::{Event, EventMetadata, NewEvent, OrderId, PartitionId};
use txn_lss::{LssError, LssFuture, LssReader, LssWriter};

use crate::clock::{Clock, FixedClock};

/// A `Vec<Event>`-backed store, seeded with the bootstrap record on
/// construction, exactly like a fresh database-backed store would be.
pub struct InMemoryLss {
    events: Mutex<Vec<Event>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryLss {
    /// A store using [`FixedClock`], for fully deterministic tests.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(FixedClock::default()))
    }

    /// A store stamping append times from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let bootstrap = Event::bootstrap(clock.now());
        Self {
            events: Mutex::new(vec![bootstrap]),
            clock,
        }
    }

    /// A snapshot of every event currently stored, for assertions.
    pub async fn all_events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

impl Default for InMemoryLss {
    fn default() -> Self {
        Self::new()
    }
}

impl LssWriter for InMemoryLss {
    fn physical_append<'a>(&'a self, new_events: Vec<NewEvent>) -> LssFuture<'a, Vec<Event>> {
        Box::pin(async move {
            let mut events = self.events.lock().await;
            let append_time = self.clock.now();
            let mut appended = Vec::with_capacity(new_events.len());
            for new_event in new_events {
                let order_id = OrderId::new(i64::try_from(events.len()).unwrap_or(i64::MAX));
                let event = Event {
                    order_id,
                    partition_id: new_event.partition_id,
                    event_type: new_event.event_type,
                    data: new_event.data,
                    metadata: EventMetadata {
                        append_time: Some(append_time),
                        extra: new_event.metadata.extra,
                    },
                };
                events.push(event.clone());
                appended.push(event);
            }
            Ok(appended)
        })
    }
}

impl LssReader for InMemoryLss {
    fn physical_read<'a>(&'a self, from: OrderId) -> LssFuture<'a, Vec<Event>> {
        Box::pin(async move {
            let events = self.events.lock().await;
            Ok(events
                .iter()
                .filter(|event| event.order_id >= from)
                .cloned()
                .collect())
        })
    }

    fn logical_read<'a>(
        &'a self,
        partition_id: &'a PartitionId,
        asc: bool,
        limit: Option<u32>,
        offset: u32,
    ) -> LssFuture<'a, Vec<Event>> {
        Box::pin(async move {
            let events = self.events.lock().await;
            let mut matching: Vec<Event> = events
                .iter()
                .filter(|event| &event.partition_id == partition_id)
                .cloned()
                .collect();
            if !asc {
                matching.reverse();
            }
            let matching = matching.into_iter().skip(offset as usize);
            Ok(match limit {
                Some(limit) => matching.take(limit as usize).collect(),
                None => matching.collect(),
            })
        })
    }

    fn logical_read_first<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event> {
        Box::pin(async move {
            let events = self.events.lock().await;
            events
                .iter()
                .find(|event| &event.partition_id == partition_id)
                .cloned()
                .ok_or_else(|| LssError::EmptyPartition(partition_id.clone()))
        })
    }

    fn logical_read_last<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event> {
        Box::pin(async move {
            let events = self.events.lock().await;
            events
                .iter()
                .rev()
                .find(|event| &event.partition_id == partition_id)
                .cloned()
                .ok_or_else(|| LssError::EmptyPartition(partition_id.clone()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeds_bootstrap_event() {
        let lss = InMemoryLss::new();
        let events = lss.all_events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].order_id, OrderId::BOOTSTRAP);
        assert_eq!(events[0].event_type, "LSS.Initialized");
    }

    #[tokio::test]
    async fn append_assigns_increasing_order_ids() {
        let lss = InMemoryLss::new();
        let appended = lss
            .physical_append(vec![
                NewEvent::new("orders", "Order.Placed", serde_json::json!({"id": 1})),
                NewEvent::new("orders", "Order.Placed", serde_json::json!({"id": 2})),
            ])
            .await
            .expect("append succeeds");
        assert_eq!(appended[0].order_id, OrderId::new(1));
        assert_eq!(appended[1].order_id, OrderId::new(2));
    }

    #[tokio::test]
    async fn logical_read_first_and_last() {
        let lss = InMemoryLss::new();
        lss.physical_append(vec![
            NewEvent::new("orders", "Order.Placed", serde_json::json!({})),
            NewEvent::new("carts", "Cart.Created", serde_json::json!({})),
            NewEvent::new("orders", "Order.Shipped", serde_json::json!({})),
        ])
        .await
        .expect("append succeeds");

        let partition = PartitionId::from("orders");
        let first = lss.logical_read_first(&partition).await.expect("has events");
        let last = lss.logical_read_last(&partition).await.expect("has events");
        assert_eq!(first.event_type, "Order.Placed");
        assert_eq!(last.event_type, "Order.Shipped");
    }

    #[tokio::test]
    async fn empty_partition_errors() {
        let lss = InMemoryLss::new();
        let partition = PartitionId::from("nothing-here");
        let err = lss.logical_read_first(&partition).await.unwrap_err();
        assert!(matches!(err, LssError::EmptyPartition(_)));
    }

    #[tokio::test]
    async fn logical_read_honors_direction_and_pagination() {
        let lss = InMemoryLss::new();
        lss.physical_append(vec![
            NewEvent::new("orders", "Order.Placed", serde_json::json!({"id": 1})),
            NewEvent::new("orders", "Order.Updated", serde_json::json!({"id": 2})),
            NewEvent::new("orders", "Order.Shipped", serde_json::json!({"id": 3})),
        ])
        .await
        .expect("append succeeds");

        let partition = PartitionId::from("orders");

        let asc = lss.logical_read(&partition, true, None, 0).await.expect("read succeeds");
        let asc_types: Vec<&str> = asc.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(asc_types, vec!["Order.Placed", "Order.Updated", "Order.Shipped"]);

        let desc_page = lss.logical_read(&partition, false, Some(1), 1).await.expect("read succeeds");
        assert_eq!(desc_page.len(), 1);
        assert_eq!(desc_page[0].event_type, "Order.Updated");
    }
}
