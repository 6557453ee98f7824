//! Networked MySQL backend.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use futures::FutureExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlPoolOptions, MySqlSslMode};
use sqlx::MySqlPool;

use crate::config::PoolConfig;
use crate::event::{Event, NewEvent};

pub(super) fn connect_options(
    host: &str,
    port: u16,
    database: &str,
    username: &str,
    password: &str,
    use_tls: bool,
) -> MySqlConnectOptions {
    let ssl_mode = if use_tls {
        MySqlSslMode::Required
    } else {
        MySqlSslMode::Disabled
    };

    // Session time zone is UTC, so DATETIME values and CURRENT_TIMESTAMP agree
    // with the UTC instants bound by the write path.
    MySqlConnectOptions::new()
        .host(host)
        .port(port)
        .database(database)
        .username(username)
        .password(password)
        .ssl_mode(ssl_mode)
        .timezone(Some(String::from("+00:00")))
        .charset("utf8mb4")
}

pub(super) async fn connect(
    options: MySqlConnectOptions,
    pool: &PoolConfig,
) -> Result<MySqlPool, sqlx::Error> {
    let probe: Arc<str> = Arc::from(pool.probe_query.as_str());

    MySqlPoolOptions::new()
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
        .connect_with(options)
        .await
}

pub(super) fn create_table_statements(table: &str) -> Vec<String> {
    vec![format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            player_name VARCHAR(255) NOT NULL,
            type VARCHAR(255) NOT NULL,
            custom_data TEXT NOT NULL,
            server_name VARCHAR(255) NOT NULL,
            timestamp DATETIME(3) NOT NULL DEFAULT CURRENT_TIMESTAMP(3),
            INDEX idx_lookup (player_name, type, timestamp)
        ) DEFAULT CHARSET = utf8mb4"
    )]
}

pub(super) async fn insert(
    conn: &mut MySqlConnection,
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
        .bind(event.timestamp.naive_utc())
        .execute(conn)
        .await?;
    Ok(result.last_insert_id() as i64)
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    player_name: String,
    event_type: String,
    custom_data: String,
    server_name: String,
    timestamp: NaiveDateTime,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            player_name: row.player_name,
            event_type: row.event_type,
            custom_data: row.custom_data,
            server_name: row.server_name,
            timestamp: row.timestamp.and_utc(),
        }
    }
}

pub(super) async fn select(
    conn: &mut MySqlConnection,
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
        .bind(start.naive_utc())
        .bind(end.naive_utc())
        .fetch_all(conn)
        .await?;

    Ok(rows.into_iter().map(Event::from).collect())
}
