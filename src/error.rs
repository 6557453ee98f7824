//! Error types for toplog.

/// Result type alias for toplog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for toplog.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Schema error: {0}")]
    Schema(#[source] sqlx::Error),

    #[error("No database connection became available in time")]
    PoolExhausted,

    #[error("Query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Write failed: {0}")]
    Write(#[source] sqlx::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Event log is shut down")]
    Closed,
}

impl Error {
    /// Connection failure without an underlying driver error.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Classify a driver error raised on the given path.
    ///
    /// Pool timeouts and a closed pool mean the same thing on every path;
    /// anything else is wrapped with `wrap`.
    pub(crate) fn from_sqlx(err: sqlx::Error, wrap: fn(sqlx::Error) -> Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Error::PoolExhausted,
            sqlx::Error::PoolClosed => Error::Closed,
            other => wrap(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_classified_as_exhausted() {
        let err = Error::from_sqlx(sqlx::Error::PoolTimedOut, Error::Query);
        assert!(matches!(err, Error::PoolExhausted));
    }

    #[test]
    fn test_pool_closed_classified_as_closed() {
        let err = Error::from_sqlx(sqlx::Error::PoolClosed, Error::Write);
        assert!(matches!(err, Error::Closed));
    }

    #[test]
    fn test_other_errors_wrapped() {
        let err = Error::from_sqlx(sqlx::Error::RowNotFound, Error::Query);
        assert!(matches!(err, Error::Query(sqlx::Error::RowNotFound)));
        assert!(err.to_string().starts_with("Query failed"));
    }
}
