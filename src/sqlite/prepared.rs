use rusqlite::types::Value;

use crate::driver::{DriverStatement, apply_length};
use crate::error::SqlReconnectError;
use crate::types::{ParamKey, RowValues};

use super::params::row_value_to_sqlite_value;

/// Bindings for one statement. The compiled form lives in rusqlite's statement cache,
/// so this value holds no borrow of the session and can be rebuilt freely.
#[derive(Debug, Clone)]
pub struct SqliteStatement {
    sql: String,
    /// Parameter names by 1-based index minus one, sigil stripped; `None` for `?`.
    names: Vec<Option<String>>,
    values: Vec<Value>,
}

impl SqliteStatement {
    pub(crate) fn new(sql: String, names: Vec<Option<String>>) -> Self {
        let values = vec![Value::Null; names.len()];
        Self { sql, names, values }
    }

    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn values(&self) -> &[Value] {
        &self.values
    }

    fn index_of(&self, key: &ParamKey) -> Result<usize, SqlReconnectError> {
        match key {
            ParamKey::Position(pos) if (1..=self.names.len()).contains(pos) => Ok(pos - 1),
            ParamKey::Name(name) => self
                .names
                .iter()
                .position(|n| n.as_deref() == Some(name.as_str()))
                .ok_or_else(|| {
                    SqlReconnectError::ParameterError(format!(
                        "statement has no parameter named {key}"
                    ))
                }),
            ParamKey::Position(_) => Err(SqlReconnectError::ParameterError(format!(
                "parameter {key} out of range; statement takes {}",
                self.names.len()
            ))),
        }
    }
}

impl DriverStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(
        &mut self,
        key: &ParamKey,
        value: RowValues,
        length: Option<usize>,
    ) -> Result<(), SqlReconnectError> {
        let idx = self.index_of(key)?;
        self.values[idx] = row_value_to_sqlite_value(&apply_length(value, length));
        Ok(())
    }
}
