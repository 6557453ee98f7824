//! Event storage: the connection pool, schema setup and per-backend SQL.
//!
//! Exactly one backend is active per process. The embedded backend is a
//! SQLite file; the networked backend is a MySQL server. Both sit behind
//! [`EventPool`], so the write and query paths never branch on the backend
//! themselves.

mod mysql;
pub mod schema;
mod sqlite;

pub use schema::ensure_schema;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool, Sqlite, SqlitePool};

use crate::config::{PoolConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::event::{Event, NewEvent};

#[derive(Clone)]
enum Backend {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
}

/// A bounded, shared pool of connections to the configured store.
///
/// Cloning is cheap and every clone refers to the same pool.
#[derive(Clone)]
pub struct EventPool {
    backend: Backend,
    table: Arc<str>,
}

/// A connection checked out of an [`EventPool`].
///
/// The connection goes back to the pool when this is dropped, on every exit path.
pub enum PooledConnection {
    Sqlite(PoolConnection<Sqlite>),
    MySql(PoolConnection<MySql>),
}

impl PooledConnection {
    /// Return the connection to the pool.
    pub fn release(self) {
        drop(self);
    }
}

/// Open the pool for the configured store and verify it with the probe query.
///
/// Fails with [`Error::Connection`] if the store cannot be reached, the
/// networked credentials are missing, or the probe fails.
pub async fn init_pool(store: &StoreConfig, pool: &PoolConfig, table: &str) -> Result<EventPool> {
    let backend = match store {
        StoreConfig::Embedded { path } => {
            let p = sqlite::connect(path, pool)
                .await
                .map_err(|e| connect_error(store, e))?;
            Backend::Sqlite(p)
        }
        StoreConfig::Networked {
            host,
            port,
            database,
            username,
            password,
            use_tls,
        } => {
            if host.trim().is_empty() {
                return Err(Error::connection("mysql.host is not set"));
            }
            if username.trim().is_empty() {
                return Err(Error::connection("mysql.username is not set"));
            }
            let options = mysql::connect_options(
                host,
                *port,
                database,
                username,
                password.expose_secret(),
                *use_tls,
            );
            let p = mysql::connect(options, pool)
                .await
                .map_err(|e| connect_error(store, e))?;
            Backend::MySql(p)
        }
    };

    let event_pool = EventPool {
        backend,
        table: Arc::from(table),
    };
    event_pool
        .probe(&pool.probe_query)
        .await
        .map_err(|e| connect_error(store, e))?;

    tracing::info!(
        backend = store.backend(),
        max_size = pool.max_size,
        acquire_timeout_secs = pool.acquire_timeout_secs,
        "Connection pool ready"
    );

    Ok(event_pool)
}

fn connect_error(store: &StoreConfig, source: sqlx::Error) -> Error {
    let message = match store {
        StoreConfig::Embedded { path } => {
            format!("cannot open SQLite store at '{}': {}", path.display(), source)
        }
        StoreConfig::Networked {
            host,
            port,
            database,
            ..
        } => format!(
            "cannot connect to MySQL at {}:{}/{}: {}",
            host, port, database, source
        ),
    };
    Error::Connection {
        message,
        source: Some(source),
    }
}

impl EventPool {
    /// Short backend label used in log fields.
    pub fn backend(&self) -> &'static str {
        match self.backend {
            Backend::Sqlite(_) => "sqlite",
            Backend::MySql(_) => "mysql",
        }
    }

    /// Name of the event table.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Check out a connection, waiting at most the configured acquire timeout.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let conn = match &self.backend {
            Backend::Sqlite(p) => p.acquire().await.map(PooledConnection::Sqlite),
            Backend::MySql(p) => p.acquire().await.map(PooledConnection::MySql),
        };
        conn.map_err(|e| Error::from_sqlx(e, Error::Query))
    }

    /// Append one event row, returning its id.
    pub async fn insert(&self, event: &NewEvent) -> Result<i64> {
        let id = match self.acquire_for_write().await? {
            PooledConnection::Sqlite(mut conn) => sqlite::insert(&mut conn, &self.table, event).await,
            PooledConnection::MySql(mut conn) => mysql::insert(&mut conn, &self.table, event).await,
        };
        id.map_err(|e| Error::from_sqlx(e, Error::Write))
    }

    /// Events for one player and type with `start <= timestamp <= end`,
    /// ascending by timestamp then id.
    pub async fn select(
        &self,
        player_name: &str,
        event_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let rows = match self.acquire().await? {
            PooledConnection::Sqlite(mut conn) => {
                sqlite::select(&mut conn, &self.table, player_name, event_type, start, end).await
            }
            PooledConnection::MySql(mut conn) => {
                mysql::select(&mut conn, &self.table, player_name, event_type, start, end).await
            }
        };
        rows.map_err(|e| Error::from_sqlx(e, Error::Query))
    }

    /// Close every connection. Calling this again is a no-op.
    pub async fn close(&self) {
        if self.is_closed() {
            return;
        }
        match &self.backend {
            Backend::Sqlite(p) => p.close().await,
            Backend::MySql(p) => p.close().await,
        }
        tracing::info!(backend = self.backend(), "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        match &self.backend {
            Backend::Sqlite(p) => p.is_closed(),
            Backend::MySql(p) => p.is_closed(),
        }
    }

    async fn acquire_for_write(&self) -> Result<PooledConnection> {
        let conn = match &self.backend {
            Backend::Sqlite(p) => p.acquire().await.map(PooledConnection::Sqlite),
            Backend::MySql(p) => p.acquire().await.map(PooledConnection::MySql),
        };
        conn.map_err(|e| Error::from_sqlx(e, Error::Write))
    }

    async fn probe(&self, query: &str) -> std::result::Result<(), sqlx::Error> {
        match &self.backend {
            Backend::Sqlite(p) => sqlx::query(query).execute(p).await.map(|_| ()),
            Backend::MySql(p) => sqlx::query(query).execute(p).await.map(|_| ()),
        }
    }

    async fn execute_ddl(&self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        match &self.backend {
            Backend::Sqlite(p) => sqlx::query(sql).execute(p).await.map(|_| ()),
            Backend::MySql(p) => sqlx::query(sql).execute(p).await.map(|_| ()),
        }
    }
}
