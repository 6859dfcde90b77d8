//! PostgreSQL-backed [`txn_lss::LssWriter`] / [`txn_lss::LssReader`].
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE lss (
//!     order_id    BIGINT PRIMARY KEY,
//!     partition_id TEXT NOT NULL,
//!     type        TEXT NOT NULL,
//!     data        JSONB NOT NULL,
//!     metadata    JSONB NOT NULL,
//!     append_time TIMESTAMPTZ NOT NULL
//! );
//! CREATE UNIQUE INDEX lss_partition_order_idx ON lss (partition_id, order_id);
//! ```
//!
//! `order_id` is already unique via the primary key; the secondary index is
//! declared unique too so a single-writer bug that assigns the same
//! `order_id` twice within a partition is caught by the database rather
//! than silently accepted.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::Mutex;
use txn_core::{Event, EventMetadata, NewEvent, OrderId, PartitionId};
use txn_lss::{LssError, LssFuture, LssReader, LssWriter};

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS lss (
    order_id     BIGINT PRIMARY KEY,
    partition_id TEXT NOT NULL,
    type         TEXT NOT NULL,
    data         JSONB NOT NULL,
    metadata     JSONB NOT NULL,
    append_time  TIMESTAMPTZ NOT NULL
)";

const CREATE_INDEX: &str =
    "CREATE UNIQUE INDEX IF NOT EXISTS lss_partition_order_idx ON lss (partition_id, order_id)";

#[derive(sqlx::FromRow)]
struct LssRow {
    order_id: i64,
    partition_id: String,
    #[sqlx(rename = "type")]
    event_type: String,
    data: serde_json::Value,
    metadata: serde_json::Value,
    append_time: DateTime<Utc>,
}

impl TryFrom<LssRow> for Event {
    type Error = LssError;

    fn try_from(row: LssRow) -> Result<Self, Self::Error> {
        let extra = match row.metadata {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(LssError::Storage(format!(
                    "metadata column did not decode to an object: {other}"
                )))
            }
        };
        Ok(Event {
            order_id: OrderId::new(row.order_id),
            partition_id: PartitionId::new(row.partition_id),
            event_type: row.event_type,
            data: row.data,
            metadata: EventMetadata {
                append_time: Some(row.append_time),
                extra,
            },
        })
    }
}

fn storage_err(err: sqlx::Error) -> LssError {
    LssError::Storage(err.to_string())
}

/// A PostgreSQL-backed log-structured store. Implements both
/// [`LssWriter`] and [`LssReader`]; callers that want to enforce the
/// single-writer discipline at the type level should hold this behind one
/// shared handle and only ever call `physical_append` from the transaction
/// coordinator.
pub struct PgLss {
    pool: PgPool,
    // Guards the order-id allocation across concurrent appends. Advanced
    // only after the append transaction commits, so a failed append never
    // leaks order ids.
    next_order_id: Mutex<i64>,
}

impl PgLss {
    /// Connect to `database_url`, ensure the schema exists, and seed the
    /// `LSS.Initialized` bootstrap event if the log is empty.
    ///
    /// # Errors
    ///
    /// Returns [`LssError::Storage`] if the connection, schema setup, or
    /// bootstrap seeding fails.
    pub async fn connect(database_url: &str) -> Result<Self, LssError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(storage_err)?;
        Self::from_pool(pool).await
    }

    /// Build from an existing pool, for callers that manage their own
    /// connection lifecycle (tests, embedding in a larger application).
    ///
    /// # Errors
    ///
    /// Returns [`LssError::Storage`] if schema setup or bootstrap seeding
    /// fails.
    pub async fn from_pool(pool: PgPool) -> Result<Self, LssError> {
        sqlx::query(CREATE_TABLE)
            .execute(&pool)
            .await
            .map_err(storage_err)?;
        sqlx::query(CREATE_INDEX)
            .execute(&pool)
            .await
            .map_err(storage_err)?;

        let next_order_id = Self::seed_and_next_order_id(&pool).await?;

        Ok(Self {
            pool,
            next_order_id: Mutex::new(next_order_id),
        })
    }

    async fn seed_and_next_order_id(pool: &PgPool) -> Result<i64, LssError> {
        let mut tx = pool.begin().await.map_err(storage_err)?;
        let max_order_id: Option<i64> = sqlx::query_scalar("SELECT MAX(order_id) FROM lss")
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_err)?;

        let next = match max_order_id {
            Some(max) => max + 1,
            None => {
                let bootstrap = Event::bootstrap(Utc::now());
                sqlx::query(
                    "INSERT INTO lss (order_id, partition_id, type, data, metadata, append_time) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(bootstrap.order_id.value())
                .bind(bootstrap.partition_id.as_str())
                .bind(&bootstrap.event_type)
                .bind(&bootstrap.data)
                .bind(serde_json::Value::Object(bootstrap.metadata.extra.clone()))
                .bind(bootstrap.metadata.append_time)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
                tracing::info!("seeded LSS.Initialized bootstrap event");
                1
            }
        };

        tx.commit().await.map_err(storage_err)?;
        Ok(next)
    }
}

impl LssWriter for PgLss {
    fn physical_append<'a>(&'a self, events: Vec<NewEvent>) -> LssFuture<'a, Vec<Event>> {
        Box::pin(async move {
            if events.is_empty() {
                return Ok(Vec::new());
            }

            let mut guard = self.next_order_id.lock().await;
            let start = *guard;
            let append_time = Utc::now();

            let mut tx = self.pool.begin().await.map_err(storage_err)?;
            let mut appended = Vec::with_capacity(events.len());
            for (offset, event) in events.into_iter().enumerate() {
                let order_id = start + i64::try_from(offset).unwrap_or(i64::MAX);
                let metadata_json = serde_json::Value::Object(event.metadata.extra.clone());
                sqlx::query(
                    "INSERT INTO lss (order_id, partition_id, type, data, metadata, append_time) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(order_id)
                .bind(event.partition_id.as_str())
                .bind(&event.event_type)
                .bind(&event.data)
                .bind(&metadata_json)
                .bind(append_time)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;

                appended.push(Event {
                    order_id: OrderId::new(order_id),
                    partition_id: event.partition_id,
                    event_type: event.event_type,
                    data: event.data,
                    metadata: EventMetadata {
                        append_time: Some(append_time),
                        extra: event.metadata.extra,
                    },
                });
            }

            tx.commit().await.map_err(storage_err)?;
            *guard = start + appended.len() as i64;
            tracing::debug!(count = appended.len(), start_order_id = start, "appended events");
            Ok(appended)
        })
    }
}

impl LssReader for PgLss {
    fn physical_read<'a>(&'a self, from: OrderId) -> LssFuture<'a, Vec<Event>> {
        Box::pin(async move {
            let rows: Vec<LssRow> = sqlx::query_as(
                "SELECT order_id, partition_id, type, data, metadata, append_time \
                 FROM lss WHERE order_id >= $1 ORDER BY order_id ASC",
            )
            .bind(from.value())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
            rows.into_iter().map(Event::try_from).collect()
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
            let direction = if asc { "ASC" } else { "DESC" };
            // A NULL `LIMIT` means "no limit" in Postgres, so `limit: None`
            // binds straight through instead of needing a sentinel value.
            let limit: Option<i64> = limit.map(i64::from);
            let query = format!(
                "SELECT order_id, partition_id, type, data, metadata, append_time \
                 FROM lss WHERE partition_id = $1 ORDER BY order_id {direction} LIMIT $2 OFFSET $3"
            );
            let rows: Vec<LssRow> = sqlx::query_as(&query)
                .bind(partition_id.as_str())
                .bind(limit)
                .bind(i64::from(offset))
                .fetch_all(&self.pool)
                .await
                .map_err(storage_err)?;
            rows.into_iter().map(Event::try_from).collect()
        })
    }

    fn logical_read_first<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event> {
        Box::pin(async move { read_one(self, partition_id, "ASC").await })
    }

    fn logical_read_last<'a>(&'a self, partition_id: &'a PartitionId) -> LssFuture<'a, Event> {
        Box::pin(async move { read_one(self, partition_id, "DESC").await })
    }
}

async fn read_one(lss: &PgLss, partition_id: &PartitionId, direction: &str) -> Result<Event, LssError> {
    let query = format!(
        "SELECT order_id, partition_id, type, data, metadata, append_time \
         FROM lss WHERE partition_id = $1 ORDER BY order_id {direction} LIMIT 1"
    );
    let row: Option<LssRow> = sqlx::query_as(&query)
        .bind(partition_id.as_str())
        .fetch_optional(&lss.pool)
        .await
        .map_err(storage_err)?;
    match row {
        Some(row) => Event::try_from(row),
        None => Err(LssError::EmptyPartition(partition_id.clone())),
    }
}
