//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::capability::{
    CustomCapability, DriverCapability, MySqlCapability, PostgresCapability, SqliteCapability,
};
pub use crate::codec::{
    EmailAddress, EmailAddressCodec, EnumCodec, IpAddressCodec, JsonCodec, Point, PointCodec,
    TimeCodec, TimeZoneCodec, TimestampCodec, ValueCodec,
};
pub use crate::config::{ConnectionConfig, ConnectionDescriptor};
pub use crate::connection::ResilientConnection;
pub use crate::driver::{Driver, DriverConnection, DriverStatement};
pub use crate::error::SqlReconnectError;
pub use crate::instrumentation::{QueryLogger, TracingQueryLogger};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::retry::{LockRetryPolicy, run_with_lock_retry};
pub use crate::statement::{ParamRef, ReplayableStatement};
pub use crate::types::{DatabaseType, ParamKey, ParamType, RowValues};

#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDriver;

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDriver, SqliteOptions};
