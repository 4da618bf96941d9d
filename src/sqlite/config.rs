use std::time::Duration;

/// Options applied to every `SQLite` session the driver opens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqliteOptions {
    /// How long `SQLite` itself waits on a locked database before reporting
    /// `database is locked`. `None` keeps the library default.
    pub busy_timeout: Option<Duration>,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    /// Statements run right after opening a session.
    pub(crate) fn pragmas(&self) -> Option<&'static str> {
        self.wal.then_some("PRAGMA journal_mode = WAL;")
    }
}
