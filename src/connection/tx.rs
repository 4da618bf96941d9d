use tracing::debug;

use crate::driver::Driver;
use crate::error::SqlReconnectError;

use super::ResilientConnection;
use super::core::BatchAttempt;

fn savepoint_name(level: u32) -> String {
    format!("sqlreconnect_{level}")
}

impl<D: Driver> ResilientConnection<D> {
    /// Start a transaction, or a savepoint when one is already open.
    ///
    /// Only the outermost `BEGIN` may be retried through a reconnect; once the level is
    /// above zero every failure propagates.
    ///
    /// # Errors
    /// Returns the driver error; the nesting level is unchanged in that case.
    pub async fn begin_transaction(&self) -> Result<(), SqlReconnectError> {
        let mut session = self.inner.session.lock().await;
        let level = session.nesting_level;
        let sql = if level == 0 {
            "BEGIN".to_string()
        } else {
            format!("SAVEPOINT {}", savepoint_name(level))
        };
        self.inner
            .run_in_session(&mut session, &BatchAttempt { sql: &sql })
            .await?;
        session.nesting_level = level + 1;
        debug!(nesting_level = session.nesting_level, "transaction level raised");
        Ok(())
    }

    /// Commit the innermost transaction level.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ExecutionError`] when no transaction is open, or the
    /// driver error, in which case the level is unchanged.
    pub async fn commit(&self) -> Result<(), SqlReconnectError> {
        let mut session = self.inner.session.lock().await;
        let level = session.nesting_level;
        let sql = match level {
            0 => {
                return Err(SqlReconnectError::ExecutionError(
                    "commit without an active transaction".into(),
                ));
            }
            1 => "COMMIT".to_string(),
            _ => format!("RELEASE SAVEPOINT {}", savepoint_name(level - 1)),
        };
        self.inner
            .run_in_session(&mut session, &BatchAttempt { sql: &sql })
            .await?;
        session.nesting_level = level - 1;
        debug!(nesting_level = session.nesting_level, "transaction level committed");
        Ok(())
    }

    /// Roll back the innermost transaction level. The level drops by one even when the
    /// driver reports an error.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ExecutionError`] when no transaction is open, or the
    /// driver error.
    pub async fn rollback(&self) -> Result<(), SqlReconnectError> {
        let mut session = self.inner.session.lock().await;
        let level = session.nesting_level;
        let sql = match level {
            0 => {
                return Err(SqlReconnectError::ExecutionError(
                    "rollback without an active transaction".into(),
                ));
            }
            1 => "ROLLBACK".to_string(),
            _ => format!("ROLLBACK TO SAVEPOINT {}", savepoint_name(level - 1)),
        };
        let result = self
            .inner
            .run_in_session(&mut session, &BatchAttempt { sql: &sql })
            .await;
        session.nesting_level = level - 1;
        debug!(nesting_level = session.nesting_level, "transaction level rolled back");
        result
    }

    pub async fn transaction_nesting_level(&self) -> u32 {
        self.inner.session.lock().await.nesting_level
    }

    pub async fn is_transaction_active(&self) -> bool {
        self.transaction_nesting_level().await > 0
    }
}
