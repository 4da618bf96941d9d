//! Prepared statements that survive reconnects.
//!
//! A [`ReplayableStatement`] remembers every binding it was given. When its connection
//! is reopened, either by its own retry loop or by any other operation on the same
//! connection, the statement is prepared again and the bindings are replayed in the
//! order they were first made.

mod bindings;

use std::fmt;
use std::sync::Weak;

use tracing::debug;

use crate::connection::core::{Inner, Session};
use crate::driver::{Driver, DriverConnection, DriverStatement};
use crate::error::SqlReconnectError;
use crate::instrumentation::{notify_start, notify_stop};
use crate::results::ResultSet;
use crate::types::{ParamKey, ParamType, RowValues};

pub use bindings::{Binding, BoundParams, BoundValue, ParamRef};

type StatementOf<D> = <<D as Driver>::Connection as DriverConnection>::Statement;

pub struct ReplayableStatement<D: Driver> {
    inner: Weak<Inner<D>>,
    sql: String,
    statement: Option<StatementOf<D>>,
    /// Session generation `statement` was prepared against.
    generation: u64,
    bindings: BoundParams,
    /// Set when the driver statement still carries per-call values from the last execute.
    overridden: bool,
}

impl<D: Driver> fmt::Debug for ReplayableStatement<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayableStatement")
            .field("sql", &self.sql)
            .field("generation", &self.generation)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> ReplayableStatement<D> {
    pub(crate) fn new(
        inner: Weak<Inner<D>>,
        sql: &str,
        statement: StatementOf<D>,
        generation: u64,
    ) -> Self {
        Self {
            inner,
            sql: sql.to_string(),
            statement: Some(statement),
            generation,
            bindings: BoundParams::default(),
            overridden: false,
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn bindings(&self) -> &BoundParams {
        &self.bindings
    }

    /// Forget all recorded bindings. The driver statement keeps its current values until
    /// the next rebuild.
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    /// Bind a snapshot of `value`.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when the value cannot be coerced to
    /// `param_type` or the driver rejects the key. The binding is recorded either way.
    pub fn bind_value(
        &mut self,
        key: impl Into<ParamKey>,
        value: RowValues,
        param_type: Option<ParamType>,
    ) -> Result<(), SqlReconnectError> {
        self.record(
            key.into(),
            Binding {
                value: BoundValue::Value(value),
                param_type,
                length: None,
            },
        )
    }

    /// Bind a live reference. Its value is read again on every execution.
    ///
    /// # Errors
    /// Same as [`bind_value`](Self::bind_value).
    pub fn bind_param(
        &mut self,
        key: impl Into<ParamKey>,
        param: &ParamRef,
        param_type: Option<ParamType>,
        length: Option<usize>,
    ) -> Result<(), SqlReconnectError> {
        self.record(
            key.into(),
            Binding {
                value: BoundValue::Reference(param.clone()),
                param_type,
                length,
            },
        )
    }

    fn record(&mut self, key: ParamKey, binding: Binding) -> Result<(), SqlReconnectError> {
        let value = binding.current();
        let length = binding.length;
        self.bindings.record(key.clone(), binding);
        match &mut self.statement {
            Some(statement) => statement.bind(&key, value?, length),
            None => value.map(|_| ()),
        }
    }

    /// Execute with the recorded bindings. `params`, when given, is bound positionally
    /// (1-based) on top of them for this call only; the next execution starts again from
    /// a freshly prepared statement carrying just the recorded bindings.
    ///
    /// On a reconnect-worthy error the connection is reopened, the statement rebuilt, the
    /// bindings replayed and the execution retried, up to the connection's budget.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ConnectionError`] if the connection was dropped, or
    /// the final driver error.
    pub async fn execute(
        &mut self,
        params: Option<&[RowValues]>,
    ) -> Result<ResultSet, SqlReconnectError> {
        let inner = self.inner.upgrade().ok_or_else(|| {
            SqlReconnectError::ConnectionError(
                "statement outlived the connection it was prepared on".into(),
            )
        })?;
        let mut session = inner.session.lock().await;

        if !inner.is_resilient() {
            return self.execute_once(&inner, &mut session, params).await;
        }

        let mut attempt = 0;
        loop {
            match self.execute_once(&inner, &mut session, params).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    inner.recover(&mut session, err, attempt).await?;
                    self.statement = None;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), returning only the affected row count.
    ///
    /// # Errors
    /// Same as [`execute`](Self::execute).
    pub async fn execute_update(
        &mut self,
        params: Option<&[RowValues]>,
    ) -> Result<usize, SqlReconnectError> {
        Ok(self.execute(params).await?.rows_affected)
    }

    async fn execute_once(
        &mut self,
        inner: &Inner<D>,
        session: &mut Session<D::Connection>,
        params: Option<&[RowValues]>,
    ) -> Result<ResultSet, SqlReconnectError> {
        inner.ensure_connected(session).await?;

        if self.statement.is_none()
            || self.generation != session.generation
            || self.overridden
        {
            debug!(
                sql = %self.sql,
                bindings = self.bindings.len(),
                generation = session.generation,
                "rebuilding statement and replaying bindings"
            );
            self.statement = None;
            let mut rebuilt = session.handle_mut()?.prepare(&self.sql).await?;
            self.bindings.replay(&mut rebuilt)?;
            self.statement = Some(rebuilt);
            self.generation = session.generation;
            self.overridden = false;
        }

        let statement = self.statement.as_mut().ok_or_else(|| {
            SqlReconnectError::ExecutionError("statement is not prepared".into())
        })?;
        self.bindings.refresh_references(statement)?;
        if let Some(params) = params.filter(|p| !p.is_empty()) {
            self.overridden = true;
            for (idx, value) in params.iter().enumerate() {
                statement.bind(&ParamKey::Position(idx + 1), value.clone(), None)?;
            }
        }

        let conn = session.handle_mut()?;
        notify_start(inner.logger.as_deref(), &self.sql);
        let result = conn.execute_prepared(statement).await;
        notify_stop(inner.logger.as_deref());
        result
    }
}
