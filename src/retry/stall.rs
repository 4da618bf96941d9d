use std::time::Duration;

use tracing::warn;

use crate::capability::DriverCapability;
use crate::error::SqlReconnectError;

/// Pause before reopening when the failure suggests the server is still recovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    delay: Duration,
}

impl StallPolicy {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delegates to the engine's own predicate.
    #[must_use]
    pub fn should_stall(error: &SqlReconnectError, capability: &dyn DriverCapability) -> bool {
        capability.should_stall(error)
    }

    /// Sleep for the configured delay if `error` calls for it. Returns whether it slept.
    pub async fn stall_if_needed(
        &self,
        error: &SqlReconnectError,
        capability: &dyn DriverCapability,
    ) -> bool {
        if !Self::should_stall(error, capability) {
            return false;
        }
        warn!(
            delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
            "wait state deemed beneficial, stalling before reconnect"
        );
        tokio::time::sleep(self.delay).await;
        true
    }
}
