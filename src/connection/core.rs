use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::capability::DriverCapability;
use crate::config::ConnectionConfig;
use crate::driver::{Driver, DriverConnection};
use crate::error::SqlReconnectError;
use crate::instrumentation::{QueryLogger, notify_start, notify_stop};
use crate::results::ResultSet;
use crate::retry::{LockRetryPolicy, StallPolicy, Verdict, classify};
use crate::types::RowValues;

/// Mutable per-connection state, guarded by one mutex so a reopen is atomic.
pub(crate) struct Session<C> {
    pub(crate) handle: Option<C>,
    pub(crate) nesting_level: u32,
    /// Bumped every time a fresh handle is opened.
    pub(crate) generation: u64,
}

impl<C> Session<C> {
    pub(crate) fn handle_mut(&mut self) -> Result<&mut C, SqlReconnectError> {
        self.handle.as_mut().ok_or_else(|| {
            SqlReconnectError::ConnectionError("connection handle is not open".into())
        })
    }
}

/// State shared between a connection and the statements prepared on it.
pub(crate) struct Inner<D: Driver> {
    pub(crate) driver: D,
    pub(crate) config: ConnectionConfig,
    pub(crate) capability: Option<Arc<dyn DriverCapability>>,
    pub(crate) attempt_budget: u32,
    pub(crate) stall: StallPolicy,
    pub(crate) lock_policy: LockRetryPolicy,
    pub(crate) logger: Option<Arc<dyn QueryLogger>>,
    pub(crate) reconnects: AtomicU64,
    pub(crate) session: Mutex<Session<D::Connection>>,
}

/// One unit of driver work that can be replayed from scratch on a fresh handle.
pub(crate) trait Attempt<C: DriverConnection>: Sync {
    type Output: Send;

    fn sql(&self) -> &str;

    /// Whether the query logger hooks bracket this attempt.
    fn instrumented(&self) -> bool {
        true
    }

    fn run(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<Self::Output, SqlReconnectError>> + Send;
}

impl<D: Driver> Inner<D> {
    /// A connection retries only when its driver can classify errors and the budget
    /// allows at least one retry.
    pub(crate) fn is_resilient(&self) -> bool {
        self.capability.is_some() && self.attempt_budget > 0
    }

    /// Open a handle if the session has none.
    pub(crate) async fn ensure_connected(
        &self,
        session: &mut Session<D::Connection>,
    ) -> Result<(), SqlReconnectError> {
        if session.handle.is_some() {
            return Ok(());
        }
        let handle = self.driver.connect(&self.config.descriptor).await?;
        session.handle = Some(handle);
        session.generation += 1;
        if session.generation > 1 {
            self.reconnects.fetch_add(1, Ordering::SeqCst);
        }
        debug!(generation = session.generation, "connection handle opened");
        Ok(())
    }

    /// Take the handle out of the session and close it. Safe on an already closed session.
    pub(crate) async fn close_session(
        &self,
        session: &mut Session<D::Connection>,
    ) -> Result<(), SqlReconnectError> {
        session.nesting_level = 0;
        match session.handle.take() {
            Some(handle) => {
                debug!(generation = session.generation, "closing connection handle");
                handle.close().await
            }
            None => Ok(()),
        }
    }

    /// Decide what to do with `err` raised by the `attempt`-th retry (0-based).
    ///
    /// Returns `Ok(())` after the broken handle was closed (and the stall, if any, has
    /// elapsed), meaning the caller should run again. Otherwise returns `err` unchanged.
    pub(crate) async fn recover(
        &self,
        session: &mut Session<D::Connection>,
        err: SqlReconnectError,
        attempt: u32,
    ) -> Result<(), SqlReconnectError> {
        warn!(
            attempt,
            nesting_level = session.nesting_level,
            error = %err,
            "driver error caught"
        );
        let Some(capability) = self.capability.as_deref() else {
            return Err(err);
        };
        match classify(
            &err,
            attempt,
            session.nesting_level,
            self.attempt_budget,
            capability,
        ) {
            Verdict::Reconnect => {
                info!(
                    attempt = attempt + 1,
                    budget = self.attempt_budget,
                    "validated to reconnect"
                );
                if let Err(close_err) = self.close_session(session).await {
                    debug!(error = %close_err, "closing broken handle failed; continuing");
                }
                self.stall.stall_if_needed(&err, capability).await;
                Ok(())
            }
            Verdict::InTransaction => {
                warn!(
                    nesting_level = session.nesting_level,
                    "refusing to reconnect inside an open transaction"
                );
                Err(err)
            }
            verdict => {
                debug!(?verdict, "could not be validated to reconnect");
                Err(err)
            }
        }
    }

    /// One execution: connect if needed, bracket the driver call with the logger hooks.
    async fn try_once<A>(
        &self,
        session: &mut Session<D::Connection>,
        op: &A,
    ) -> Result<A::Output, SqlReconnectError>
    where
        A: Attempt<D::Connection>,
    {
        self.ensure_connected(session).await?;
        let conn = session.handle_mut()?;
        if !op.instrumented() {
            return op.run(conn).await;
        }
        notify_start(self.logger.as_deref(), op.sql());
        let result = op.run(conn).await;
        notify_stop(self.logger.as_deref());
        result
    }

    /// The reconnect envelope, for a caller already holding the session lock.
    ///
    /// At most `attempt_budget + 1` executions.
    pub(crate) async fn run_in_session<A>(
        &self,
        session: &mut Session<D::Connection>,
        op: &A,
    ) -> Result<A::Output, SqlReconnectError>
    where
        A: Attempt<D::Connection>,
    {
        let mut attempt = 0;
        loop {
            match self.try_once(session, op).await {
                Ok(output) => return Ok(output),
                Err(err) => {
                    self.recover(session, err, attempt).await?;
                    attempt += 1;
                }
            }
        }
    }

    pub(crate) async fn run_with_reconnect<A>(&self, op: &A) -> Result<A::Output, SqlReconnectError>
    where
        A: Attempt<D::Connection>,
    {
        let mut session = self.session.lock().await;
        self.run_in_session(&mut session, op).await
    }
}

pub(crate) struct QueryAttempt<'a> {
    pub(crate) sql: &'a str,
    pub(crate) params: Vec<RowValues>,
}

impl<C: DriverConnection> Attempt<C> for QueryAttempt<'_> {
    type Output = ResultSet;

    fn sql(&self) -> &str {
        self.sql
    }

    fn run(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<ResultSet, SqlReconnectError>> + Send {
        async move { conn.query(self.sql, &self.params).await }
    }
}

pub(crate) struct UpdateAttempt<'a> {
    pub(crate) sql: &'a str,
    pub(crate) params: Vec<RowValues>,
}

impl<C: DriverConnection> Attempt<C> for UpdateAttempt<'_> {
    type Output = usize;

    fn sql(&self) -> &str {
        self.sql
    }

    fn run(&self, conn: &mut C) -> impl Future<Output = Result<usize, SqlReconnectError>> + Send {
        async move { conn.execute(self.sql, &self.params).await }
    }
}

pub(crate) struct RawAttempt<'a> {
    pub(crate) sql: &'a str,
}

impl<C: DriverConnection> Attempt<C> for RawAttempt<'_> {
    type Output = ResultSet;

    fn sql(&self) -> &str {
        self.sql
    }

    fn run(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<ResultSet, SqlReconnectError>> + Send {
        async move { conn.query_raw(self.sql).await }
    }
}

pub(crate) struct BatchAttempt<'a> {
    pub(crate) sql: &'a str,
}

impl<C: DriverConnection> Attempt<C> for BatchAttempt<'_> {
    type Output = ();

    fn sql(&self) -> &str {
        self.sql
    }

    fn run(&self, conn: &mut C) -> impl Future<Output = Result<(), SqlReconnectError>> + Send {
        async move { conn.execute_batch(self.sql).await }
    }
}

pub(crate) struct PrepareAttempt<'a> {
    pub(crate) sql: &'a str,
}

impl<C: DriverConnection> Attempt<C> for PrepareAttempt<'_> {
    type Output = C::Statement;

    fn sql(&self) -> &str {
        self.sql
    }

    fn run(
        &self,
        conn: &mut C,
    ) -> impl Future<Output = Result<C::Statement, SqlReconnectError>> + Send {
        async move { conn.prepare(self.sql).await }
    }
}

/// Opens the session and does nothing else.
pub(crate) struct ConnectAttempt;

impl<C: DriverConnection> Attempt<C> for ConnectAttempt {
    type Output = ();

    fn sql(&self) -> &str {
        ""
    }

    fn instrumented(&self) -> bool {
        false
    }

    fn run(&self, _conn: &mut C) -> impl Future<Output = Result<(), SqlReconnectError>> + Send {
        std::future::ready(Ok(()))
    }
}
