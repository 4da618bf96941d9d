// SQLite driver
//
// - config: open options (busy timeout, WAL)
// - connection: driver, live session and the blocking bridge
// - params: RowValues -> rusqlite values
// - prepared: statement bindings
// - query: result extraction and building

pub mod config;
pub mod connection;
pub mod params;
pub mod prepared;
pub mod query;

pub use config::SqliteOptions;
pub use connection::{SqliteDriver, SqliteSession};
pub use prepared::SqliteStatement;
pub use query::build_result_set;
