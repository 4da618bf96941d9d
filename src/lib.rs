//! Reconnect-and-replay wrappers for SQL connections.
//!
//! A [`ResilientConnection`] wraps one driver session. When an operation fails with an
//! error the driver's [`DriverCapability`] marks as transient ("server has gone away",
//! a dropped socket, a failed DNS lookup) the session is closed, optionally after a
//! pause, reopened, and the operation is run again, up to a configured number of
//! times. Retries are never attempted inside an open transaction.
//!
//! Prepared statements come back as [`ReplayableStatement`]s, which record their
//! bindings and replay them against the reopened session. [`run_with_lock_retry`]
//! adds a separate loop for lock-wait timeouts and deadlocks.
//!
//! ```rust,no_run
//! use sql_reconnect::prelude::*;
//!
//! # async fn demo() -> Result<(), SqlReconnectError> {
//! let config = ConnectionConfig::builder(ConnectionDescriptor::path("app.db"))
//!     .reconnect_attempts(2)
//!     .build()?;
//! let conn = ResilientConnection::connect(SqliteDriver::default(), config).await?;
//! let rows = conn
//!     .run_query("SELECT name FROM users WHERE id = ?1", &[RowValues::Int(7)], &[])
//!     .await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod codec;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod instrumentation;
pub mod prelude;
pub mod results;
pub mod retry;
pub mod statement;
pub mod types;

#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use capability::{
    CustomCapability, DriverCapability, MySqlCapability, PostgresCapability, SqliteCapability,
};
pub use config::{ConnectionConfig, ConnectionConfigBuilder, ConnectionDescriptor, DriverOptions};
pub use connection::{ResilientConnection, ResilientConnectionBuilder};
pub use driver::{Driver, DriverConnection, DriverStatement};
pub use error::SqlReconnectError;
pub use instrumentation::{QueryLogger, TracingQueryLogger};
pub use results::{CustomDbRow, ResultSet};
pub use retry::{LockRetryPolicy, StallPolicy, run_with_lock_retry, should_retry};
pub use statement::{ParamRef, ReplayableStatement};
pub use types::{DatabaseType, ParamKey, ParamType, RowValues};
