use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{debug, warn};

use crate::capability::{DriverCapability, PostgresCapability};
use crate::config::ConnectionDescriptor;
use crate::driver::{Driver, DriverConnection, DriverStatement, apply_length};
use crate::error::SqlReconnectError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, ParamKey, RowValues};

use super::params::Params;
use super::query::{build_result_set_from_simple, build_result_set_from_statement};

/// Opens `PostgreSQL` sessions over plain TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDriver;

fn pg_config(descriptor: &ConnectionDescriptor) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    if let Some(host) = &descriptor.host {
        config.host(host);
    }
    if let Some(port) = descriptor.port {
        config.port(port);
    }
    if let Some(user) = &descriptor.user {
        config.user(user);
    }
    if let Some(password) = &descriptor.password {
        config.password(password);
    }
    if let Some(dbname) = &descriptor.dbname {
        config.dbname(dbname);
    }
    config
}

#[async_trait]
impl Driver for PostgresDriver {
    type Connection = PostgresSession;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }

    fn capability(&self) -> Option<Arc<dyn DriverCapability>> {
        Some(Arc::new(PostgresCapability))
    }

    async fn connect(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> Result<PostgresSession, SqlReconnectError> {
        debug!(host = ?descriptor.host, port = ?descriptor.port, "opening postgres session");
        let (client, connection) = pg_config(descriptor).connect(NoTls).await?;
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection task ended with an error");
            }
        });
        Ok(PostgresSession { client, task })
    }
}

/// One `tokio-postgres` client plus the task driving its socket.
pub struct PostgresSession {
    client: Client,
    task: JoinHandle<()>,
}

impl fmt::Debug for PostgresSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresSession")
            .field("closed", &self.client.is_closed())
            .finish_non_exhaustive()
    }
}

impl PostgresSession {
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// A server-side prepared statement with positional (`$1`) bindings.
pub struct PostgresStatement {
    sql: String,
    statement: Statement,
    values: Vec<RowValues>,
}

impl fmt::Debug for PostgresStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStatement")
            .field("sql", &self.sql)
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl DriverStatement for PostgresStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        key: &ParamKey,
        value: RowValues,
        length: Option<usize>,
    ) -> Result<(), SqlReconnectError> {
        let ParamKey::Position(pos) = key else {
            return Err(SqlReconnectError::ParameterError(format!(
                "postgres statements bind by position only, got {key}"
            )));
        };
        let slot = pos
            .checked_sub(1)
            .and_then(|idx| self.values.get_mut(idx))
            .ok_or_else(|| {
                SqlReconnectError::ParameterError(format!(
                    "parameter {key} out of range; statement takes {}",
                    self.statement.params().len()
                ))
            })?;
        *slot = apply_length(value, length);
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for PostgresSession {
    type Statement = PostgresStatement;

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, SqlReconnectError> {
        let stmt = self.client.prepare(sql).await?;
        let converted = Params::convert(params);
        let rows = self.client.query(&stmt, converted.as_refs()).await?;
        build_result_set_from_statement(&stmt, &rows)
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<usize, SqlReconnectError> {
        let converted = Params::convert(params);
        let rows = self.client.execute(sql, converted.as_refs()).await?;
        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    async fn query_raw(&mut self, sql: &str) -> Result<ResultSet, SqlReconnectError> {
        let messages = self.client.simple_query(sql).await?;
        Ok(build_result_set_from_simple(&messages))
    }

    async fn execute_batch(&mut self, sql: &str) -> Result<(), SqlReconnectError> {
        Ok(self.client.batch_execute(sql).await?)
    }

    async fn prepare(&mut self, sql: &str) -> Result<PostgresStatement, SqlReconnectError> {
        let statement = self.client.prepare(sql).await?;
        Ok(PostgresStatement {
            sql: sql.to_string(),
            values: vec![RowValues::Null; statement.params().len()],
            statement,
        })
    }

    async fn execute_prepared(
        &mut self,
        statement: &mut PostgresStatement,
    ) -> Result<ResultSet, SqlReconnectError> {
        let converted = Params::convert(&statement.values);
        if statement.statement.columns().is_empty() {
            let rows = self
                .client
                .execute(&statement.statement, converted.as_refs())
                .await?;
            return Ok(ResultSet::affected(
                usize::try_from(rows).unwrap_or(usize::MAX),
            ));
        }
        let rows = self
            .client
            .query(&statement.statement, converted.as_refs())
            .await?;
        build_result_set_from_statement(&statement.statement, &rows)
    }

    async fn close(self) -> Result<(), SqlReconnectError> {
        drop(self.client);
        if let Err(e) = self.task.await {
            debug!(error = %e, "postgres connection task did not finish cleanly");
        }
        Ok(())
    }
}
