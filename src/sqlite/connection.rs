use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::params_from_iter;
use tokio::sync::Mutex;
use tracing::debug;

use crate::capability::{DriverCapability, SqliteCapability};
use crate::config::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection, DriverStatement};
use crate::error::SqlReconnectError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

use super::config::SqliteOptions;
use super::params::Params;
use super::prepared::SqliteStatement;
use super::query::build_result_set;

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// Run `func` against the connection on tokio's blocking pool.
pub(crate) async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlReconnectError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlReconnectError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| SqlReconnectError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

/// Opens file-backed (or `:memory:`) `SQLite` sessions.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver {
    options: SqliteOptions,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(options: SqliteOptions) -> Self {
        Self { options }
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    type Connection = SqliteSession;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Sqlite
    }

    fn capability(&self) -> Option<Arc<dyn DriverCapability>> {
        Some(Arc::new(SqliteCapability))
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<SqliteSession, SqlReconnectError> {
        let path = descriptor.path.clone().ok_or_else(|| {
            SqlReconnectError::ConfigError("sqlite connections need a path".into())
        })?;
        let options = self.options.clone();
        debug!(path = %path, "opening sqlite session");

        let conn = tokio::task::spawn_blocking(move || -> Result<_, SqlReconnectError> {
            let conn = rusqlite::Connection::open(&path)?;
            if let Some(timeout) = options.busy_timeout {
                conn.busy_timeout(timeout)?;
            }
            if let Some(pragmas) = options.pragmas() {
                conn.execute_batch(pragmas)?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| SqlReconnectError::ConnectionError(format!("sqlite open join error: {e}")))??;

        Ok(SqliteSession {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// One open `SQLite` handle.
pub struct SqliteSession {
    conn: SharedSqliteConnection,
}

impl fmt::Debug for SqliteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteSession").finish_non_exhaustive()
    }
}

impl SqliteSession {
    /// Borrow the raw rusqlite connection for work this crate does not wrap.
    ///
    /// # Errors
    /// Returns whatever `func` returns.
    pub async fn with_connection<F, R>(&self, func: F) -> Result<R, SqlReconnectError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlReconnectError> + Send + 'static,
        R: Send + 'static,
    {
        run_blocking(Arc::clone(&self.conn), func).await
    }
}

#[async_trait]
impl DriverConnection for SqliteSession {
    type Statement = SqliteStatement;

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlReconnectError> {
        let sql = sql.to_string();
        let params = Params::convert(params);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            build_result_set(&mut stmt, params.as_values())
        })
        .await
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlReconnectError> {
        let sql = sql.to_string();
        let params = Params::convert(params);
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            Ok(stmt.execute(params_from_iter(params.as_values().iter()))?)
        })
        .await
    }

    async fn query_raw(&mut self, sql: &str) -> Result<ResultSet, SqlReconnectError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            build_result_set(&mut stmt, &[])
        })
        .await
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlReconnectError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| Ok(conn.execute_batch(&sql)?))
            .await
    }

    async fn prepare(&mut self, sql: &str) -> Result<SqliteStatement, SqlReconnectError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| {
            let names = {
                let stmt = conn.prepare_cached(&sql)?;
                (1..=stmt.parameter_count())
                    .map(|idx| {
                        stmt.parameter_name(idx)
                            .map(|n| n.trim_start_matches([':', '@', '$']).to_string())
                    })
                    .collect()
            };
            Ok(SqliteStatement::new(sql, names))
        })
        .await
    }

    async fn execute_prepared(
        &mut self,
        statement: &mut SqliteStatement,
    ) -> Result<ResultSet, SqlReconnectError> {
        let sql = statement.sql().to_string();
        let values = statement.values().to_vec();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            build_result_set(&mut stmt, &values)
        })
        .await
    }

    async fn close(self) -> Result<(), SqlReconnectError> {
        match Arc::try_unwrap(self.conn) {
            Ok(conn) => conn
                .into_inner()
                .close()
                .map_err(|(_, e)| SqlReconnectError::from(e)),
            // A blocking task still holds a clone; it drops the handle when it finishes.
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamKey;

    async fn memory_session() -> SqliteSession {
        SqliteDriver::default()
            .connect(&ConnectionDescriptor::path(":memory:"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn prepared_statement_binds_named_parameters() {
        let mut session = memory_session().await;
        session
            .execute_batch("CREATE TABLE t (id INTEGER, name TEXT); INSERT INTO t VALUES (1, 'one'), (2, 'two');")
            .await
            .unwrap();

        let mut stmt = session
            .prepare("SELECT name FROM t WHERE id = :id")
            .await
            .unwrap();
        assert_eq!(stmt.parameter_count(), 1);
        stmt.bind(&ParamKey::named("id"), RowValues::Int(2), None)
            .unwrap();
        let rs = session.execute_prepared(&mut stmt).await.unwrap();
        assert_eq!(rs.scalar(), Some(&RowValues::Text("two".into())));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn dml_reports_affected_rows() {
        let mut session = memory_session().await;
        session
            .execute_batch("CREATE TABLE t (id INTEGER)")
            .await
            .unwrap();
        let n = session
            .execute(
                "INSERT INTO t VALUES (?1), (?2)",
                &[RowValues::Int(1), RowValues::Int(2)],
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
        let rs = session.query_raw("DELETE FROM t").await.unwrap();
        assert_eq!(rs.rows_affected, 2);
        assert!(rs.is_empty());
    }
}
