//! The seam between the retry engine and a concrete database driver.
//!
//! A [`Driver`] opens sessions; a [`DriverConnection`] is one live session. Neither knows
//! anything about retries: [`ResilientConnection`](crate::ResilientConnection) wraps
//! them and decides when to close, reopen and run again.

use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::DriverCapability;
use crate::config::ConnectionDescriptor;
use crate::error::SqlReconnectError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, ParamKey, RowValues};

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Connection: DriverConnection;

    fn database_type(&self) -> DatabaseType;

    /// Transient-error knowledge for this driver. `None` makes every connection opened
    /// through it a plain passthrough with no reconnect retry.
    fn capability(&self) -> Option<Arc<dyn DriverCapability>>;

    /// Open a new session.
    ///
    /// # Errors
    /// Returns the driver's connect error unchanged.
    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<Self::Connection, SqlReconnectError>;
}

/// One live session.
///
/// Parameters arrive already coerced to their declared types.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    type Statement: DriverStatement;

    /// Run a row-returning statement.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlReconnectError>;

    /// Run a DML statement and return the affected row count.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn execute(&mut self, sql: &str, params: &[RowValues])
    -> Result<usize, SqlReconnectError>;

    /// Run SQL through the driver's native, unparameterized path.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn query_raw(&mut self, sql: &str) -> Result<ResultSet, SqlReconnectError>;

    /// Run one or more statements that return nothing (transaction control, DDL).
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlReconnectError>;

    /// Create a server-side (or cached) statement for later binding.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn prepare(&mut self, sql: &str) -> Result<Self::Statement, SqlReconnectError>;

    /// Execute a prepared statement with whatever is currently bound to it.
    ///
    /// Row-returning statements fill `results`; others only set `rows_affected`.
    ///
    /// # Errors
    /// Returns the driver error unchanged.
    async fn execute_prepared(
        &mut self,
        statement: &mut Self::Statement,
    ) -> Result<ResultSet, SqlReconnectError>;

    /// Release the session.
    ///
    /// # Errors
    /// Returns the driver error unchanged; the session is unusable either way.
    async fn close(self) -> Result<(), SqlReconnectError>;
}

/// Driver half of a prepared statement: holds the current bindings.
pub trait DriverStatement: Send + 'static {
    fn sql(&self) -> &str;

    /// Bind `value` under `key`, replacing an earlier binding for the same key.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when the statement has no such
    /// parameter or the driver rejects the value.
    fn bind(
        &mut self,
        key: &ParamKey,
        value: RowValues,
        length: Option<usize>,
    ) -> Result<(), SqlReconnectError>;
}

/// Truncate text/blob values to a declared maximum length, as `bindParam` length does.
#[must_use]
pub fn apply_length(value: RowValues, length: Option<usize>) -> RowValues {
    match (value, length) {
        (RowValues::Text(mut s), Some(max)) if s.chars().count() > max => {
            let cut = s.char_indices().nth(max).map_or(s.len(), |(idx, _)| idx);
            s.truncate(cut);
            RowValues::Text(s)
        }
        (RowValues::Blob(mut b), Some(max)) if b.len() > max => {
            b.truncate(max);
            RowValues::Blob(b)
        }
        (value, _) => value,
    }
}
