//! The event log engine: startup, the write and query paths, and shutdown.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::{Event, NewEvent, TimeBasis};
use crate::storage::{self, EventPool};
use crate::writer::{EventWriter, WriterStats};

/// A running event log.
///
/// Built by [`EventLog::start`]; pass it by reference to whatever needs to
/// log or query. Call [`EventLog::shutdown`] before dropping it so queued
/// writes are drained before the pool closes.
pub struct EventLog {
    pool: EventPool,
    writer: EventWriter,
    time_basis: TimeBasis,
}

impl EventLog {
    /// Open the pool, ensure the schema and start the background writer.
    ///
    /// Connection and schema failures are fatal: no engine is returned and
    /// any pool that was opened is closed again.
    pub async fn start(config: &Config) -> Result<Self> {
        config.validate()?;

        let store = config.store();
        tracing::info!(backend = store.backend(), table = %config.storage.table, "Starting event log");

        let pool = storage::init_pool(&store, &config.pool, &config.storage.table).await?;

        if let Err(e) = storage::ensure_schema(&pool).await {
            tracing::error!(error = %e, "Schema setup failed, refusing to start");
            pool.close().await;
            return Err(e);
        }

        // Leave one connection free for queries when the pool allows it.
        let max_in_flight = (config.pool.max_size as usize).saturating_sub(1).max(1);
        let writer = EventWriter::spawn(pool.clone(), config.writer.queue_capacity, max_in_flight);

        Ok(Self {
            pool,
            writer,
            time_basis: config.query.time_zone,
        })
    }

    /// Record an event stamped with the current instant. Returns immediately.
    pub fn log_event(&self, player_name: &str, event_type: &str, custom_data: &str, server_name: &str) {
        self.record(NewEvent::now(player_name, event_type, custom_data, server_name));
    }

    /// Record a prepared event. Returns immediately; failures are only logged.
    pub fn record(&self, event: NewEvent) {
        self.writer.record(event);
    }

    /// Wait for every event recorded so far to be written or to fail.
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush().await
    }

    /// Events for `player_name` / `event_type` with `start <= timestamp <= end`,
    /// ascending by timestamp. An inverted range yields an empty list.
    pub async fn query(
        &self,
        player_name: &str,
        event_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        if self.writer.is_shut_down() {
            return Err(Error::Closed);
        }

        tracing::debug!(
            player = %player_name,
            event_type = %event_type,
            start = %start,
            end = %end,
            "Events query"
        );

        self.pool.select(player_name, event_type, start, end).await
    }

    /// Like [`EventLog::query`], rendered as display lines.
    pub async fn query_events(
        &self,
        player_name: &str,
        event_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        let events = self.query(player_name, event_type, start, end).await?;
        Ok(events.iter().map(|e| e.render(self.time_basis)).collect())
    }

    /// Drain queued writes, then close the pool. Calling this again is a no-op.
    pub async fn shutdown(&self) {
        self.writer.shutdown().await;
        self.pool.close().await;
    }

    pub fn stats(&self) -> WriterStats {
        self.writer.stats()
    }

    pub fn pool(&self) -> &EventPool {
        &self.pool
    }

    pub fn time_basis(&self) -> TimeBasis {
        self.time_basis
    }
}
