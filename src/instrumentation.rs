//! Query start/stop hooks.
//!
//! Hooks are a side channel: the connection calls them around every execution attempt
//! and logs hook failures without letting them change the outcome of the operation.

use std::error::Error;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

pub type HookError = Box<dyn Error + Send + Sync>;

pub trait QueryLogger: Send + Sync + fmt::Debug {
    /// Called before a statement is dispatched to the driver.
    ///
    /// # Errors
    /// Implementations may fail; the failure is logged and ignored.
    fn start_query(&self, sql: &str) -> Result<(), HookError>;

    /// Called once the driver returned, successfully or not.
    ///
    /// # Errors
    /// Implementations may fail; the failure is logged and ignored.
    fn stop_query(&self) -> Result<(), HookError>;
}

/// Call `start_query`, swallowing (and logging) any failure.
pub(crate) fn notify_start(logger: Option<&dyn QueryLogger>, sql: &str) {
    if let Some(logger) = logger
        && let Err(err) = logger.start_query(sql)
    {
        warn!(error = %err, "query logger failed on start; ignoring");
    }
}

/// Call `stop_query`, swallowing (and logging) any failure.
pub(crate) fn notify_stop(logger: Option<&dyn QueryLogger>) {
    if let Some(logger) = logger
        && let Err(err) = logger.stop_query()
    {
        warn!(error = %err, "query logger failed on stop; ignoring");
    }
}

/// Logs every query and its duration at `debug` level.
#[derive(Debug, Default)]
pub struct TracingQueryLogger {
    current: Mutex<Option<(String, Instant)>>,
}

impl TracingQueryLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueryLogger for TracingQueryLogger {
    fn start_query(&self, sql: &str) -> Result<(), HookError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| "tracing query logger mutex poisoned")?;
        *current = Some((sql.to_string(), Instant::now()));
        debug!(sql, "query start");
        Ok(())
    }

    fn stop_query(&self) -> Result<(), HookError> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| "tracing query logger mutex poisoned")?;
        if let Some((sql, started)) = current.take() {
            debug!(
                sql,
                elapsed_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
                "query stop"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Broken;

    impl QueryLogger for Broken {
        fn start_query(&self, _sql: &str) -> Result<(), HookError> {
            Err("start exploded".into())
        }

        fn stop_query(&self) -> Result<(), HookError> {
            Err("stop exploded".into())
        }
    }

    #[test]
    fn failing_hooks_are_swallowed() {
        notify_start(Some(&Broken), "SELECT 1");
        notify_stop(Some(&Broken));
        notify_start(None, "SELECT 1");
    }

    #[test]
    fn tracing_logger_clears_current_query() {
        let logger = TracingQueryLogger::new();
        logger.start_query("SELECT 1").unwrap();
        logger.stop_query().unwrap();
        assert!(logger.current.lock().unwrap().is_none());
    }
}
