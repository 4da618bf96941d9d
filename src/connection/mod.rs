//! [`ResilientConnection`]: a driver session that reconnects and re-runs work when the
//! driver reports a transient failure.
//!
//! One value models one database session. Every public operation takes the session lock
//! for its whole retry loop, so a reopen is never observed half-done by another caller.

pub(crate) mod core;
mod tx;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use crate::capability::DriverCapability;
use crate::config::ConnectionConfig;
use crate::driver::Driver;
use crate::error::SqlReconnectError;
use crate::instrumentation::QueryLogger;
use crate::results::ResultSet;
use crate::retry::{LockRetryPolicy, StallPolicy, run_with_lock_retry};
use crate::statement::ReplayableStatement;
use crate::types::{DatabaseType, ParamType, RowValues, apply_param_types};

use self::core::{
    BatchAttempt, ConnectAttempt, Inner, PrepareAttempt, QueryAttempt, RawAttempt, Session,
    UpdateAttempt,
};

pub struct ResilientConnection<D: Driver> {
    pub(crate) inner: Arc<Inner<D>>,
}

impl<D: Driver> std::fmt::Debug for ResilientConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientConnection")
            .field("database_type", &self.inner.driver.database_type())
            .field("attempt_budget", &self.inner.attempt_budget)
            .field("descriptor", &self.inner.config.descriptor)
            .finish_non_exhaustive()
    }
}

/// Options applied when a [`ResilientConnection`] is created.
pub struct ResilientConnectionBuilder<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    capability: Option<Option<Arc<dyn DriverCapability>>>,
    lock_policy: Option<LockRetryPolicy>,
    logger: Option<Arc<dyn QueryLogger>>,
}

impl<D: Driver> ResilientConnectionBuilder<D> {
    /// Attach an instrumentation hook called around every execution attempt.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Replace the driver's own capability. `None` turns the connection into a
    /// passthrough that never reconnects.
    #[must_use]
    pub fn capability(mut self, capability: Option<Arc<dyn DriverCapability>>) -> Self {
        self.capability = Some(capability);
        self
    }

    /// Override the lock-contention signatures and delay used by
    /// [`ResilientConnection::lock_safe_update`].
    #[must_use]
    pub fn lock_retry_policy(mut self, policy: LockRetryPolicy) -> Self {
        self.lock_policy = Some(policy);
        self
    }

    /// Build without touching the network; the session opens on first use.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ConfigError`] when the configuration is invalid for
    /// the driver's engine.
    pub fn build(self) -> Result<ResilientConnection<D>, SqlReconnectError> {
        self.config.validate()?;
        self.config
            .descriptor
            .require_fields(self.driver.database_type())?;

        let capability = self
            .capability
            .unwrap_or_else(|| self.driver.capability());
        let attempt_budget = self.config.effective_attempt_budget(capability.as_deref());
        let delay = self.config.transaction_restart_delay();
        let lock_policy = self.lock_policy.unwrap_or_else(|| match capability.as_deref() {
            Some(cap) => LockRetryPolicy::from_capability(cap, delay),
            None => LockRetryPolicy::new(LockRetryPolicy::default().signatures().to_vec(), delay),
        });

        debug!(
            database_type = ?self.driver.database_type(),
            attempt_budget,
            "resilient connection configured"
        );

        Ok(ResilientConnection {
            inner: Arc::new(Inner {
                driver: self.driver,
                config: self.config,
                capability,
                attempt_budget,
                stall: StallPolicy::new(delay),
                lock_policy,
                logger: self.logger,
                reconnects: AtomicU64::new(0),
                session: Mutex::new(Session {
                    handle: None,
                    nesting_level: 0,
                    generation: 0,
                }),
            }),
        })
    }

    /// Build and open the session right away. A failed first connect is classified and
    /// retried like any other operation.
    ///
    /// # Errors
    /// Returns the configuration error or the final connect error.
    pub async fn connect(self) -> Result<ResilientConnection<D>, SqlReconnectError> {
        let connection = self.build()?;
        connection.reconnect_if_closed().await?;
        Ok(connection)
    }
}

impl<D: Driver> ResilientConnection<D> {
    #[must_use]
    pub fn builder(driver: D, config: ConnectionConfig) -> ResilientConnectionBuilder<D> {
        ResilientConnectionBuilder {
            driver,
            config,
            capability: None,
            lock_policy: None,
            logger: None,
        }
    }

    /// Open a connection with default options.
    ///
    /// # Errors
    /// Returns the configuration error or the final connect error.
    pub async fn connect(driver: D, config: ConnectionConfig) -> Result<Self, SqlReconnectError> {
        Self::builder(driver, config).connect().await
    }

    /// Run a row-returning statement. Values are coerced to `types` (missing entries
    /// keep their own type) once, then sent unchanged on every attempt.
    ///
    /// # Errors
    /// Returns the final driver error when it is not transient or the budget ran out.
    pub async fn run_query(
        &self,
        sql: &str,
        params: &[RowValues],
        types: &[Option<ParamType>],
    ) -> Result<ResultSet, SqlReconnectError> {
        let params = apply_param_types(params, types)?;
        self.inner
            .run_with_reconnect(&QueryAttempt { sql, params })
            .await
    }

    /// Run a DML statement and return the affected row count.
    ///
    /// # Errors
    /// Returns the final driver error when it is not transient or the budget ran out.
    pub async fn run_update(
        &self,
        sql: &str,
        params: &[RowValues],
        types: &[Option<ParamType>],
    ) -> Result<usize, SqlReconnectError> {
        let params = apply_param_types(params, types)?;
        self.inner
            .run_with_reconnect(&UpdateAttempt { sql, params })
            .await
    }

    /// Run SQL through the driver's unparameterized path. The broken handle is torn down
    /// and a new one opened before every retry.
    ///
    /// # Errors
    /// Returns the final driver error when it is not transient or the budget ran out.
    pub async fn run_raw(&self, sql: &str) -> Result<ResultSet, SqlReconnectError> {
        self.inner.run_with_reconnect(&RawAttempt { sql }).await
    }

    /// Run statements that return nothing, such as DDL.
    ///
    /// # Errors
    /// Returns the final driver error when it is not transient or the budget ran out.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), SqlReconnectError> {
        self.inner.run_with_reconnect(&BatchAttempt { sql }).await
    }

    /// Prepare a statement that survives reconnects.
    ///
    /// # Errors
    /// Returns the final driver error when preparing fails.
    pub async fn prepare(&self, sql: &str) -> Result<ReplayableStatement<D>, SqlReconnectError> {
        let mut session = self.inner.session.lock().await;
        let statement = self
            .inner
            .run_in_session(&mut session, &PrepareAttempt { sql })
            .await?;
        Ok(ReplayableStatement::new(
            Arc::downgrade(&self.inner),
            sql,
            statement,
            session.generation,
        ))
    }

    /// `run_update` wrapped in the lock-contention loop: on a deadlock or lock-wait
    /// timeout the update is re-issued after the restart delay, up to `max_attempts`
    /// calls in total. A `max_attempts` of 0 still runs the update once.
    ///
    /// # Errors
    /// Returns the final error unchanged.
    pub async fn lock_safe_update(
        &self,
        sql: &str,
        params: &[RowValues],
        max_attempts: u32,
    ) -> Result<usize, SqlReconnectError> {
        run_with_lock_retry(
            || self.run_update(sql, params, &[]),
            max_attempts,
            &self.inner.lock_policy,
        )
        .await
    }

    /// Close the session. Calling it again is a no-op; an operation issued afterwards
    /// opens a new session.
    ///
    /// # Errors
    /// Returns the driver's close error the first time it happens.
    pub async fn close(&self) -> Result<(), SqlReconnectError> {
        let mut session = self.inner.session.lock().await;
        self.inner.close_session(&mut session).await
    }

    /// Open the session if it is closed.
    ///
    /// # Errors
    /// Returns the final connect error.
    pub async fn reconnect_if_closed(&self) -> Result<(), SqlReconnectError> {
        self.inner.run_with_reconnect(&ConnectAttempt).await
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.session.lock().await.handle.is_some()
    }

    /// Whether failed operations can be retried through a reconnect at all.
    #[must_use]
    pub fn is_resilient(&self) -> bool {
        self.inner.is_resilient()
    }

    #[must_use]
    pub fn attempt_budget(&self) -> u32 {
        self.inner.attempt_budget
    }

    /// Sessions opened after the first one.
    #[must_use]
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnects.load(Ordering::SeqCst)
    }

    /// Number of sessions opened so far, the first one included.
    pub async fn generation(&self) -> u64 {
        self.inner.session.lock().await.generation
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.inner.driver.database_type()
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn lock_retry_policy(&self) -> &LockRetryPolicy {
        &self.inner.lock_policy
    }
}
