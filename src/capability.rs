//! Per-engine knowledge about which driver errors are transient.
//!
//! A capability answers three questions for the retry engine: which error messages mean
//! "the session is gone, reconnect", which of those mean "the server is still coming
//! back, wait first", and which mean "the session is fine but the transaction lost a lock
//! race". Matching is a case-insensitive substring test on the error message chain.

use std::borrow::Cow;
use std::fmt;

use crate::error::SqlReconnectError;
use crate::retry::message_matches;
use crate::types::DatabaseType;

pub type Signature = Cow<'static, str>;

pub trait DriverCapability: Send + Sync + fmt::Debug {
    /// Ordered substrings identifying reconnect-worthy errors.
    fn reconnect_exceptions(&self) -> &[Signature];

    /// Whether the connection should pause before reopening after `error`.
    fn should_stall(&self, error: &SqlReconnectError) -> bool;

    /// Substrings identifying lock-wait timeouts and deadlocks.
    fn lock_contention_signatures(&self) -> &[Signature] {
        &[]
    }
}

/// Built-in capability for an engine.
#[must_use]
pub fn for_database(db_type: DatabaseType) -> Box<dyn DriverCapability> {
    match db_type {
        DatabaseType::Mysql => Box::new(MySqlCapability),
        DatabaseType::Postgres => Box::new(PostgresCapability),
        DatabaseType::Sqlite => Box::new(SqliteCapability),
    }
}

const MYSQL_RECONNECT: &[Signature] = &[
    Cow::Borrowed("MySQL server has gone away"),
    Cow::Borrowed("Lost connection to MySQL server"),
    Cow::Borrowed("getaddrinfo failed"),
    Cow::Borrowed("failed to lookup address information"),
];
const MYSQL_LOCK: &[Signature] = &[Cow::Borrowed("try restarting transaction")];

/// `MySQL` / `MariaDB`: error 2006 ("server has gone away") and DNS failures reconnect;
/// DNS failures also stall because the host is usually still being rescheduled.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlCapability;

impl DriverCapability for MySqlCapability {
    fn reconnect_exceptions(&self) -> &[Signature] {
        MYSQL_RECONNECT
    }

    fn should_stall(&self, error: &SqlReconnectError) -> bool {
        let message = error.message_chain();
        message.contains("php_network_getaddresses")
            || message_matches(
                &message,
                &[
                    Cow::Borrowed("getaddrinfo failed"),
                    Cow::Borrowed("failed to lookup address information"),
                ],
            )
    }

    fn lock_contention_signatures(&self) -> &[Signature] {
        MYSQL_LOCK
    }
}

const POSTGRES_RECONNECT: &[Signature] = &[
    Cow::Borrowed("connection closed"),
    Cow::Borrowed("connection reset by peer"),
    Cow::Borrowed("broken pipe"),
    Cow::Borrowed("terminating connection due to administrator command"),
    Cow::Borrowed("the database system is starting up"),
    Cow::Borrowed("the database system is shutting down"),
    Cow::Borrowed("connection refused"),
    Cow::Borrowed("failed to lookup address information"),
];
const POSTGRES_STALL: &[Signature] = &[
    Cow::Borrowed("the database system is starting up"),
    Cow::Borrowed("connection refused"),
    Cow::Borrowed("failed to lookup address information"),
];
const POSTGRES_LOCK: &[Signature] = &[
    Cow::Borrowed("deadlock detected"),
    Cow::Borrowed("could not serialize access"),
    Cow::Borrowed("canceling statement due to lock timeout"),
];

/// `PostgreSQL`: dropped sockets and administrator shutdowns reconnect; a server that is
/// refusing connections or still starting up stalls first.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCapability;

impl DriverCapability for PostgresCapability {
    fn reconnect_exceptions(&self) -> &[Signature] {
        POSTGRES_RECONNECT
    }

    fn should_stall(&self, error: &SqlReconnectError) -> bool {
        message_matches(&error.message_chain(), POSTGRES_STALL)
    }

    fn lock_contention_signatures(&self) -> &[Signature] {
        POSTGRES_LOCK
    }
}

const SQLITE_RECONNECT: &[Signature] = &[
    Cow::Borrowed("unable to open database file"),
    Cow::Borrowed("disk I/O error"),
];
const SQLITE_STALL: &[Signature] = &[Cow::Borrowed("unable to open database file")];
const SQLITE_LOCK: &[Signature] = &[
    Cow::Borrowed("database is locked"),
    Cow::Borrowed("database table is locked"),
];

/// `SQLite`: the file handle is reopened after I/O failures (network filesystems,
/// remounted volumes); `SQLITE_BUSY` is treated as lock contention.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCapability;

impl DriverCapability for SqliteCapability {
    fn reconnect_exceptions(&self) -> &[Signature] {
        SQLITE_RECONNECT
    }

    fn should_stall(&self, error: &SqlReconnectError) -> bool {
        message_matches(&error.message_chain(), SQLITE_STALL)
    }

    fn lock_contention_signatures(&self) -> &[Signature] {
        SQLITE_LOCK
    }
}

/// Capability assembled from configuration.
#[derive(Debug, Clone, Default)]
pub struct CustomCapability {
    reconnect: Vec<Signature>,
    stall: Vec<Signature>,
    lock: Vec<Signature>,
}

impl CustomCapability {
    pub fn new<I, S>(reconnect: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            reconnect: reconnect.into_iter().map(|s| Cow::Owned(s.into())).collect(),
            stall: Vec::new(),
            lock: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_stall_on<I, S>(mut self, stall: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stall = stall.into_iter().map(|s| Cow::Owned(s.into())).collect();
        self
    }

    #[must_use]
    pub fn with_lock_signatures<I, S>(mut self, lock: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock = lock.into_iter().map(|s| Cow::Owned(s.into())).collect();
        self
    }
}

impl DriverCapability for CustomCapability {
    fn reconnect_exceptions(&self) -> &[Signature] {
        &self.reconnect
    }

    fn should_stall(&self, error: &SqlReconnectError) -> bool {
        message_matches(&error.message_chain(), &self.stall)
    }

    fn lock_contention_signatures(&self) -> &[Signature] {
        &self.lock
    }
}
