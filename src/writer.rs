//! Fire-and-forget event writes on a background worker.
//!
//! Callers hand events to [`EventWriter::record`], which only enqueues them.
//! A single worker task drains the queue and spawns each insert, with at most
//! as many inserts in flight as the pool has connections. Failures are logged,
//! counted and dropped: there is no retry and no return channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{Error, Result};
use crate::event::NewEvent;
use crate::storage::EventPool;

enum WriteRequest {
    Event(NewEvent),
    /// Answered once every event queued before it has been written or has failed.
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct WriterCounters {
    accepted: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of the writer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Events accepted onto the queue
    pub accepted: u64,
    /// Events stored successfully
    pub written: u64,
    /// Events whose insert failed
    pub failed: u64,
    /// Events rejected because the queue was full or the writer was shut down
    pub dropped: u64,
}

/// Handle to the background write path.
pub struct EventWriter {
    tx: Mutex<Option<mpsc::Sender<WriteRequest>>>,
    /// Held across the drain so concurrent shutdowns all wait for it.
    worker: AsyncMutex<Option<JoinHandle<()>>>,
    counters: Arc<WriterCounters>,
}

impl EventWriter {
    /// Start the worker. Must be called from within a tokio runtime.
    pub fn spawn(pool: EventPool, queue_capacity: usize, max_in_flight: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let counters = Arc::new(WriterCounters::default());
        let worker = tokio::spawn(run_worker(
            pool,
            rx,
            Arc::clone(&counters),
            max_in_flight.max(1),
        ));

        Self {
            tx: Mutex::new(Some(tx)),
            worker: AsyncMutex::new(Some(worker)),
            counters,
        }
    }

    /// Enqueue an event for writing. Never blocks and never fails.
    ///
    /// If the queue is full or the writer has been shut down the event is
    /// dropped with a warning.
    pub fn record(&self, event: NewEvent) {
        let guard = self.tx.lock().unwrap();
        let Some(tx) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                player = %event.player_name,
                event_type = %event.event_type,
                "Event log is shut down, dropping event"
            );
            return;
        };

        match tx.try_send(WriteRequest::Event(event)) {
            Ok(()) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(WriteRequest::Event(event))) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    player = %event.player_name,
                    event_type = %event.event_type,
                    capacity = tx.max_capacity(),
                    "Write queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(_)) | Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Write worker stopped, dropping event");
            }
        }
    }

    /// Wait until every event recorded before this call has been written or has failed.
    pub async fn flush(&self) -> Result<()> {
        let tx = self.tx.lock().unwrap().clone().ok_or(Error::Closed)?;
        let (done_tx, done_rx) = oneshot::channel();
        tx.send(WriteRequest::Flush(done_tx))
            .await
            .map_err(|_| Error::Closed)?;
        done_rx.await.map_err(|_| Error::Closed)
    }

    /// Stop accepting events and wait for the queue to drain.
    ///
    /// Every caller returns only after the drain has finished, so a second
    /// or concurrent call is a no-op that still waits.
    pub async fn shutdown(&self) {
        // Dropping the last sender ends the worker loop once the queue is empty.
        drop(self.tx.lock().unwrap().take());

        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Write worker terminated abnormally");
            }
            let stats = self.stats();
            tracing::info!(
                accepted = stats.accepted,
                written = stats.written,
                failed = stats.failed,
                dropped = stats.dropped,
                "Write worker drained"
            );
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.tx.lock().unwrap().is_none()
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

async fn run_worker(
    pool: EventPool,
    mut rx: mpsc::Receiver<WriteRequest>,
    counters: Arc<WriterCounters>,
    max_in_flight: usize,
) {
    let permits = Arc::new(Semaphore::new(max_in_flight));
    let mut tasks = JoinSet::new();

    while let Some(request) = rx.recv().await {
        match request {
            WriteRequest::Event(event) => {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let pool = pool.clone();
                let counters = Arc::clone(&counters);
                tasks.spawn(async move {
                    let _permit = permit;
                    write_event(&pool, &event, &counters).await;
                });
                // Reap finished inserts so the set stays small.
                while tasks.try_join_next().is_some() {}
            }
            WriteRequest::Flush(done) => {
                while tasks.join_next().await.is_some() {}
                let _ = done.send(());
            }
        }
    }

    while tasks.join_next().await.is_some() {}
}

async fn write_event(pool: &EventPool, event: &NewEvent, counters: &WriterCounters) {
    match pool.insert(event).await {
        Ok(id) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                id,
                player = %event.player_name,
                event_type = %event.event_type,
                "Event written"
            );
        }
        Err(e) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                player = %event.player_name,
                event_type = %event.event_type,
                server = %event.server_name,
                custom_data = %event.custom_data,
                timestamp = %event.timestamp,
                backend = pool.backend(),
                table = pool.table(),
                error = %e,
                details = ?e,
                "Failed to write event to database"
            );
        }
    }
}
