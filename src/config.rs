use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capability::DriverCapability;
use crate::error::SqlReconnectError;
use crate::types::DatabaseType;

/// Default number of reconnect retries per operation.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 3;
/// Default pause before reopening a stalled connection or restarting a locked transaction.
pub const DEFAULT_TRANSACTION_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Driver-level switches carried alongside the connection target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Overrides [`ConnectionConfig::reconnect_attempts`] when the driver can classify
    /// reconnect-worthy errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
}

/// Where to connect. Opaque to the retry engine; only drivers read it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,
    /// File path (or `:memory:`) for embedded engines.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub driver_options: DriverOptions,
}

// Manual Debug implementation so passwords never reach logs
impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDescriptor")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("dbname", &self.dbname)
            .field("path", &self.path)
            .field("driver_options", &self.driver_options)
            .finish()
    }
}

impl ConnectionDescriptor {
    /// Descriptor for an embedded database file.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Descriptor for a networked server.
    #[must_use]
    pub fn server(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = Some(dbname.into());
        self
    }

    #[must_use]
    pub fn with_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.driver_options.reconnect_attempts = Some(attempts);
        self
    }

    /// Check the fields a driver for `db_type` needs.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ConfigError`] naming the first missing field.
    pub fn require_fields(&self, db_type: DatabaseType) -> Result<(), SqlReconnectError> {
        let missing = |field: &str| SqlReconnectError::ConfigError(format!("{field} is required"));
        match db_type {
            DatabaseType::Sqlite => {
                if self.path.is_none() {
                    return Err(missing("path"));
                }
            }
            DatabaseType::Postgres | DatabaseType::Mysql => {
                if self.host.is_none() {
                    return Err(missing("host"));
                }
                if self.dbname.is_none() {
                    return Err(missing("dbname"));
                }
                if self.user.is_none() {
                    return Err(missing("user"));
                }
            }
        }
        Ok(())
    }
}

/// Immutable settings fixed when a connection is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub descriptor: ConnectionDescriptor,
    #[serde(default = "default_reconnect_attempts")]
    reconnect_attempts: u32,
    #[serde(
        rename = "transaction_restart_delay_secs",
        default = "default_restart_delay",
        with = "duration_secs"
    )]
    transaction_restart_delay: Duration,
}

fn default_reconnect_attempts() -> u32 {
    DEFAULT_RECONNECT_ATTEMPTS
}

fn default_restart_delay() -> Duration {
    DEFAULT_TRANSACTION_RESTART_DELAY
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(value.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

impl ConnectionConfig {
    #[must_use]
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            descriptor,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            transaction_restart_delay: DEFAULT_TRANSACTION_RESTART_DELAY,
        }
    }

    #[must_use]
    pub fn builder(descriptor: ConnectionDescriptor) -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new(descriptor)
    }

    /// Parse a JSON document such as
    /// `{"descriptor": {"path": "app.db"}, "reconnect_attempts": 2, "transaction_restart_delay_secs": 1}`.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ConfigError`] on malformed JSON or invalid values.
    pub fn from_json(json: &str) -> Result<Self, SqlReconnectError> {
        let config: ConnectionConfig = serde_json::from_str(json)
            .map_err(|e| SqlReconnectError::ConfigError(format!("invalid connection config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`SqlReconnectError::ConfigError`] if the restart delay is zero.
    pub fn validate(&self) -> Result<(), SqlReconnectError> {
        if self.transaction_restart_delay.is_zero() {
            return Err(SqlReconnectError::ConfigError(
                "transaction restart delay must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured retry budget, before the driver capability is taken into account.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    #[must_use]
    pub fn transaction_restart_delay(&self) -> Duration {
        self.transaction_restart_delay
    }

    /// Retry budget the connection actually uses with `capability`.
    ///
    /// - no capability: the driver cannot classify errors, so 0;
    /// - descriptor override present: the override, or 0 when the capability lists no
    ///   reconnect signatures;
    /// - otherwise the configured `reconnect_attempts`.
    #[must_use]
    pub fn effective_attempt_budget(&self, capability: Option<&dyn DriverCapability>) -> u32 {
        let Some(capability) = capability else {
            return 0;
        };
        match self.descriptor.driver_options.reconnect_attempts {
            Some(_) if capability.reconnect_exceptions().is_empty() => 0,
            Some(attempts) => attempts,
            None => self.reconnect_attempts,
        }
    }
}

/// Fluent builder for [`ConnectionConfig`].
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    config: ConnectionConfig,
}

impl ConnectionConfigBuilder {
    #[must_use]
    pub fn new(descriptor: ConnectionDescriptor) -> Self {
        Self {
            config: ConnectionConfig::new(descriptor),
        }
    }

    #[must_use]
    pub fn reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnect_attempts = attempts;
        self
    }

    #[must_use]
    pub fn transaction_restart_delay(mut self, delay: Duration) -> Self {
        self.config.transaction_restart_delay = delay;
        self
    }

    /// # Errors
    /// Returns [`SqlReconnectError::ConfigError`] if the configuration is invalid.
    pub fn build(self) -> Result<ConnectionConfig, SqlReconnectError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
