use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;
#[cfg(feature = "postgres")]
use tokio_postgres;

#[derive(Debug, Error)]
pub enum SqlReconnectError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlReconnectError {
    /// Full message used for signature matching: the display text followed by every
    /// `source()` in the chain, separated by `": "`.
    ///
    /// Driver errors often carry the interesting text (`server has gone away`,
    /// `deadlock detected`) in a nested cause rather than the top-level message.
    #[must_use]
    pub fn message_chain(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_chain_of_plain_variant_is_display_text() {
        let err = SqlReconnectError::ConnectionError("MySQL server has gone away".into());
        assert_eq!(
            err.message_chain(),
            "Connection error: MySQL server has gone away"
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn message_chain_includes_sqlite_text() {
        let err = SqlReconnectError::from(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ErrorCode::DatabaseBusy,
                extended_code: rusqlite::ErrorCode::DatabaseBusy as i32,
            },
            Some("database is locked".into()),
        ));
        assert!(err.message_chain().contains("database is locked"));
    }
}
