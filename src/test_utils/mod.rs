//! Test doubles for exercising the retry engine without a database server.
//!
//! Enabled for this crate's own tests and, for downstream crates, through the
//! `test-utils` feature.

mod scripted;

pub use scripted::{
    DriverEvent, ScriptedConnection, ScriptedDriver, ScriptedOp, ScriptedStatement,
    mysql_like_capability,
};

use crate::config::{ConnectionConfig, ConnectionDescriptor};

/// Config pointing at a fictional `MySQL`-style server, with a 10 ms restart delay so
/// stalls and lock retries stay fast.
///
/// # Panics
/// Panics if the builder rejects the literal values, which would be a bug here.
#[must_use]
pub fn scripted_config(reconnect_attempts: u32) -> ConnectionConfig {
    let descriptor = ConnectionDescriptor::server("db.internal", 3306)
        .with_credentials("app", "secret")
        .with_dbname("app");
    ConnectionConfig::builder(descriptor)
        .reconnect_attempts(reconnect_attempts)
        .transaction_restart_delay(std::time::Duration::from_millis(10))
        .build()
        .expect("scripted config is valid")
}
