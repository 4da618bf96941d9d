// PostgreSQL driver
//
// - connection: driver, live session, prepared statements
// - params: ToSql for RowValues
// - query: result extraction and building

pub mod connection;
pub mod params;
pub mod query;

pub use connection::{PostgresDriver, PostgresSession, PostgresStatement};
pub use params::Params;
pub use query::{build_result_set_from_rows, build_result_set_from_statement};
