use std::fmt;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlReconnectError;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used by every driver so retry code never branches on driver types:
/// ```rust
/// use sql_reconnect::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

/// The database engines a connection can target.
///
/// Every engine has a [`DriverCapability`](crate::capability::DriverCapability); only
/// `Sqlite` and `Postgres` ship with a driver implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `PostgreSQL` database
    Postgres,
    /// `SQLite` database
    Sqlite,
    /// `MySQL` / `MariaDB` database
    Mysql,
}

/// Declared type of a bound parameter.
///
/// Mirrors the binding types drivers understand. The declared type coerces the bound
/// value before it reaches the driver; `None` in a `types` slice means "keep as given".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Null,
    Integer,
    String,
    LargeObject,
    Boolean,
    Float,
    Timestamp,
    Json,
}

impl ParamType {
    /// Coerce `value` to this declared type.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when the value cannot be represented
    /// as the declared type.
    pub fn coerce(self, value: RowValues) -> Result<RowValues, SqlReconnectError> {
        if value.is_null() {
            return Ok(RowValues::Null);
        }
        let coerced = match (self, value) {
            (ParamType::Null, _) => RowValues::Null,
            (ParamType::Integer, RowValues::Int(i)) => RowValues::Int(i),
            (ParamType::Integer, RowValues::Bool(b)) => RowValues::Int(i64::from(b)),
            (ParamType::Integer, RowValues::Text(s)) => {
                RowValues::Int(s.trim().parse::<i64>().map_err(|e| {
                    SqlReconnectError::ParameterError(format!("'{s}' is not an integer: {e}"))
                })?)
            }
            (ParamType::String, RowValues::Text(s)) => RowValues::Text(s),
            (ParamType::String, RowValues::Int(i)) => RowValues::Text(i.to_string()),
            (ParamType::String, RowValues::Float(f)) => RowValues::Text(f.to_string()),
            (ParamType::String, RowValues::Bool(b)) => RowValues::Text(b.to_string()),
            (ParamType::String, RowValues::Timestamp(dt)) => {
                RowValues::Text(dt.format("%F %T%.f").to_string())
            }
            (ParamType::String, RowValues::JSON(v)) => RowValues::Text(v.to_string()),
            (ParamType::LargeObject, RowValues::Blob(b)) => RowValues::Blob(b),
            (ParamType::LargeObject, RowValues::Text(s)) => RowValues::Blob(s.into_bytes()),
            (ParamType::Boolean, RowValues::Bool(b)) => RowValues::Bool(b),
            (ParamType::Boolean, RowValues::Int(i)) => RowValues::Bool(i != 0),
            (ParamType::Float, RowValues::Float(f)) => RowValues::Float(f),
            #[allow(clippy::cast_precision_loss)]
            (ParamType::Float, RowValues::Int(i)) => RowValues::Float(i as f64),
            (ParamType::Timestamp, RowValues::Timestamp(dt)) => RowValues::Timestamp(dt),
            (ParamType::Timestamp, text @ RowValues::Text(_)) => {
                let dt = text.as_timestamp().ok_or_else(|| {
                    SqlReconnectError::ParameterError(format!(
                        "cannot parse {text:?} as a timestamp"
                    ))
                })?;
                RowValues::Timestamp(dt)
            }
            (ParamType::Json, RowValues::JSON(v)) => RowValues::JSON(v),
            (ParamType::Json, RowValues::Text(s)) => {
                RowValues::JSON(serde_json::from_str(&s).map_err(|e| {
                    SqlReconnectError::ParameterError(format!("invalid JSON parameter: {e}"))
                })?)
            }
            (ty, other) => {
                return Err(SqlReconnectError::ParameterError(format!(
                    "cannot bind {other:?} as {ty:?}"
                )));
            }
        };
        Ok(coerced)
    }
}

/// Apply declared types to a parameter list, position by position.
///
/// Missing or `None` entries leave the value untouched.
///
/// # Errors
/// Returns [`SqlReconnectError::ParameterError`] if any coercion fails.
pub fn apply_param_types(
    params: &[RowValues],
    types: &[Option<ParamType>],
) -> Result<Vec<RowValues>, SqlReconnectError> {
    params
        .iter()
        .enumerate()
        .map(|(idx, value)| match types.get(idx).copied().flatten() {
            Some(ty) => ty.coerce(value.clone()),
            None => Ok(value.clone()),
        })
        .collect()
}

/// Key a prepared-statement parameter is bound under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamKey {
    /// 1-based positional parameter (`?1`, `$1`).
    Position(usize),
    /// Named parameter, stored without its sigil (`:name` binds as `name`).
    Name(String),
}

impl ParamKey {
    #[must_use]
    pub fn named(name: &str) -> Self {
        ParamKey::Name(name.trim_start_matches([':', '@', '$']).to_string())
    }
}

impl From<usize> for ParamKey {
    fn from(position: usize) -> Self {
        ParamKey::Position(position)
    }
}

impl From<&str> for ParamKey {
    fn from(name: &str) -> Self {
        ParamKey::named(name)
    }
}

impl From<String> for ParamKey {
    fn from(name: String) -> Self {
        ParamKey::named(&name)
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKey::Position(idx) => write!(f, "?{idx}"),
            ParamKey::Name(name) => write!(f, ":{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_declared_types() {
        assert_eq!(
            ParamType::Boolean.coerce(RowValues::Int(0)).unwrap(),
            RowValues::Bool(false)
        );
        assert_eq!(
            ParamType::String.coerce(RowValues::Int(5)).unwrap(),
            RowValues::Text("5".into())
        );
        assert_eq!(
            ParamType::Integer.coerce(RowValues::Text(" 42 ".into())).unwrap(),
            RowValues::Int(42)
        );
        assert_eq!(
            ParamType::Integer.coerce(RowValues::Null).unwrap(),
            RowValues::Null
        );
    }

    #[test]
    fn rejects_impossible_coercion() {
        let err = ParamType::Boolean
            .coerce(RowValues::Blob(vec![1, 2]))
            .unwrap_err();
        assert!(matches!(err, SqlReconnectError::ParameterError(_)));
    }

    #[test]
    fn apply_param_types_skips_untyped_positions() {
        let params = vec![RowValues::Int(1), RowValues::Text("{\"a\":1}".into())];
        let out = apply_param_types(&params, &[None, Some(ParamType::Json)]).unwrap();
        assert_eq!(out[0], RowValues::Int(1));
        assert_eq!(out[1], RowValues::JSON(serde_json::json!({"a": 1})));
    }

    #[test]
    fn named_keys_drop_sigils() {
        assert_eq!(ParamKey::from(":p1"), ParamKey::Name("p1".into()));
        assert_eq!(ParamKey::from("p1").to_string(), ":p1");
        assert_eq!(ParamKey::from(2).to_string(), "?2");
    }
}
