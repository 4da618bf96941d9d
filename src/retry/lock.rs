use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::capability::{DriverCapability, Signature};
use crate::config::DEFAULT_TRANSACTION_RESTART_DELAY;
use crate::error::SqlReconnectError;

use super::message_matches;

/// Signatures and backoff for restarting a transaction that lost a lock race.
///
/// The connection stays healthy in this failure class, so the loop never reconnects.
/// Signature wording is engine specific (`MySQL` says "try restarting transaction",
/// `PostgreSQL` says "deadlock detected"), hence the configurable list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRetryPolicy {
    signatures: Vec<Signature>,
    delay: Duration,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            signatures: vec![Cow::Borrowed("try restarting transaction")],
            delay: DEFAULT_TRANSACTION_RESTART_DELAY,
        }
    }
}

impl LockRetryPolicy {
    pub fn new<I, S>(signatures: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Signature>,
    {
        Self {
            signatures: signatures.into_iter().map(Into::into).collect(),
            delay,
        }
    }

    /// Seed the signature list from an engine capability.
    #[must_use]
    pub fn from_capability(capability: &dyn DriverCapability, delay: Duration) -> Self {
        Self {
            signatures: capability.lock_contention_signatures().to_vec(),
            delay,
        }
    }

    #[must_use]
    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub fn is_lock_contention(&self, error: &SqlReconnectError) -> bool {
        message_matches(&error.message_chain(), &self.signatures)
    }
}

/// Run `update` until it succeeds, fails with something other than lock contention, or
/// `max_attempts` calls have been made. A `max_attempts` of 0 is treated as 1.
///
/// The last error is returned unchanged.
///
/// # Errors
/// Propagates the error of the final call.
pub async fn run_with_lock_retry<F, Fut, T>(
    mut update: F,
    max_attempts: u32,
    policy: &LockRetryPolicy,
) -> Result<T, SqlReconnectError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SqlReconnectError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match update().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && policy.is_lock_contention(&err) => {
                warn!(
                    attempt,
                    max_attempts,
                    error = %err,
                    "lock contention, restarting transaction after delay"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => {
                debug!(attempt, error = %err, "lock retry giving up");
                return Err(err);
            }
        }
    }
}
