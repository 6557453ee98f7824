//! Idempotent creation of the event table.

use super::{mysql, sqlite, Backend, EventPool};
use crate::error::{Error, Result};

/// Create the event table and its lookup index if absent, then verify the
/// timestamp column is readable.
///
/// Safe to run against an existing table: nothing is dropped or altered.
pub async fn ensure_schema(pool: &EventPool) -> Result<()> {
    let statements = match pool.backend {
        Backend::Sqlite(_) => sqlite::create_table_statements(pool.table()),
        Backend::MySql(_) => mysql::create_table_statements(pool.table()),
    };

    for sql in &statements {
        pool.execute_ddl(sql).await.map_err(schema_error)?;
    }

    let check = format!("SELECT timestamp FROM {} LIMIT 1", pool.table());
    pool.execute_ddl(&check).await.map_err(schema_error)?;

    tracing::info!(
        backend = pool.backend(),
        table = pool.table(),
        "Event table ready"
    );
    Ok(())
}

fn schema_error(err: sqlx::Error) -> Error {
    Error::from_sqlx(err, Error::Schema)
}
