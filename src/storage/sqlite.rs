//! Embedded SQLite backend.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::FutureExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::SqlitePool;

use crate::config::PoolConfig;
use crate::event::{Event, NewEvent};

/// Stored timestamp text. Fixed width, so text order is time order.
/// Matches `strftime('%Y-%m-%d %H:%M:%f')` used for the column default.
const STORE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Open the pool. The database file is created if it doesn't exist.
/// WAL journal mode is used for concurrent read/write performance.
pub(super) async fn connect(path: &Path, pool: &PoolConfig) -> Result<SqlitePool, sqlx::Error> {
    let opts = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .create_if_missing(true);

    let probe: Arc<str> = Arc::from(pool.probe_query.as_str());

    SqlitePoolOptions::new()
        .max_connections(pool.max_size)
        .acquire_timeout(pool.acquire_timeout())
        .test_before_acquire(false)
        .before_acquire(move |conn, _meta| {
            let probe = Arc::clone(&probe);
            async move {
                sqlx::query(&probe).execute(&mut *conn).await?;
                Ok::<_, sqlx::Error>(true)
            }
            .boxed()
        })
        .connect_with(opts)
        .await
}

pub(super) fn create_table_statements(table: &str) -> Vec<String> {
    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_name TEXT NOT NULL,
                type TEXT NOT NULL,
                custom_data TEXT NOT NULL,
                server_name TEXT NOT NULL,
                timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_lookup \
             ON {table} (player_name, type, timestamp)"
        ),
    ]
}

pub(super) async fn insert(
    conn: &mut SqliteConnection,
    table: &str,
    event: &NewEvent,
) -> Result<i64, sqlx::Error> {
    let sql = format!(
        "INSERT INTO {table} (player_name, type, custom_data, server_name, timestamp) \
         VALUES (?, ?, ?, ?, ?)"
    );
    let result = sqlx::query(&sql)
        .bind(&event.player_name)
        .bind(&event.event_type)
        .bind(&event.custom_data)
        .bind(&event.server_name)
        .bind(event.timestamp.format(STORE_FORMAT).to_string())
        .execute(conn)
        .await?;
    Ok(result.last_insert_rowid())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    player_name: String,
    event_type: String,
    custom_data: String,
    server_name: String,
    timestamp: String,
}

impl TryFrom<EventRow> for Event {
    type Error = sqlx::Error;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let timestamp = NaiveDateTime::parse_from_str(&row.timestamp, STORE_FORMAT)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .and_utc();
        Ok(Event {
            id: row.id,
            player_name: row.player_name,
            event_type: row.event_type,
            custom_data: row.custom_data,
            server_name: row.server_name,
            timestamp,
        })
    }
}

pub(super) async fn select(
    conn: &mut SqliteConnection,
    table: &str,
    player_name: &str,
    event_type: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Event>, sqlx::Error> {
    let sql = format!(
        "SELECT id, player_name, type AS event_type, custom_data, server_name, timestamp \
         FROM {table} \
         WHERE player_name = ? AND type = ? AND timestamp BETWEEN ? AND ? \
         ORDER BY timestamp ASC, id ASC"
    );
    let rows = sqlx::query_as::<_, EventRow>(&sql)
        .bind(player_name)
        .bind(event_type)
        .bind(start.format(STORE_FORMAT).to_string())
        .bind(end.format(STORE_FORMAT).to_string())
        .fetch_all(conn)
        .await?;

    rows.into_iter().map(Event::try_from).collect()
}
