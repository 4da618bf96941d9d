use crate::error::SqlReconnectError;
use crate::types::{DatabaseType, RowValues};

use super::ValueCodec;

/// A column restricted to a closed set of stored values, each with a readable label.
#[derive(Debug, Clone)]
pub struct EnumCodec {
    name: String,
    choices: Vec<(RowValues, String)>,
}

impl EnumCodec {
    pub fn new<I, L>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = (RowValues, L)>,
        L: Into<String>,
    {
        Self {
            name: name.into(),
            choices: choices
                .into_iter()
                .map(|(value, label)| (value, label.into()))
                .collect(),
        }
    }

    /// The classic `y`/`n` flag.
    #[must_use]
    pub fn yes_no(name: impl Into<String>) -> Self {
        Self::new(
            name,
            [
                (RowValues::Text("y".into()), "yes"),
                (RowValues::Text("n".into()), "no"),
            ],
        )
    }

    #[must_use]
    pub fn contains(&self, value: &RowValues) -> bool {
        self.choices.iter().any(|(v, _)| v == value)
    }

    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when `value` is not one of the choices.
    pub fn label(&self, value: &RowValues) -> Result<&str, SqlReconnectError> {
        self.choices
            .iter()
            .find(|(v, _)| v == value)
            .map(|(_, label)| label.as_str())
            .ok_or_else(|| self.invalid(value))
    }

    #[must_use]
    pub fn values(&self) -> Vec<&RowValues> {
        self.choices.iter().map(|(v, _)| v).collect()
    }

    /// Column type for `CREATE TABLE`: a native `ENUM` on `MySQL`, a `CHECK` constraint
    /// elsewhere.
    #[must_use]
    pub fn sql_declaration(&self, column: &str, db_type: DatabaseType) -> String {
        let values = self
            .choices
            .iter()
            .map(|(v, _)| match v {
                RowValues::Int(i) => i.to_string(),
                RowValues::Text(s) => format!("'{}'", s.replace('\'', "''")),
                other => format!("'{other:?}'"),
            })
            .collect::<Vec<_>>()
            .join(", ");
        match db_type {
            DatabaseType::Sqlite => format!("TEXT CHECK({column} IN ({values}))"),
            DatabaseType::Postgres => format!("VARCHAR(255) CHECK({column} IN ({values}))"),
            DatabaseType::Mysql => format!("ENUM({values})"),
        }
    }

    fn invalid(&self, value: &RowValues) -> SqlReconnectError {
        SqlReconnectError::ParameterError(format!(
            "invalid value {value:?} for enum '{}'",
            self.name
        ))
    }
}

impl ValueCodec for EnumCodec {
    type Value = RowValues;

    fn name(&self) -> &str {
        &self.name
    }

    fn decode(&self, raw: &RowValues) -> Result<RowValues, SqlReconnectError> {
        if self.contains(raw) {
            Ok(raw.clone())
        } else {
            Err(self.invalid(raw))
        }
    }

    fn encode(&self, value: &RowValues) -> Result<RowValues, SqlReconnectError> {
        self.decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gender() -> EnumCodec {
        EnumCodec::new(
            "enumGender",
            [(RowValues::Int(1), "Man"), (RowValues::Int(2), "Woman")],
        )
    }

    #[test]
    fn rejects_values_outside_the_set() {
        let codec = gender();
        assert_eq!(codec.label(&RowValues::Int(2)).unwrap(), "Woman");
        let err = codec.encode(&RowValues::Int(3)).unwrap_err();
        assert!(err.to_string().contains("enumGender"));
        assert_eq!(codec.encode_nullable(None).unwrap(), RowValues::Null);
    }

    #[test]
    fn declaration_depends_on_engine() {
        let codec = EnumCodec::yes_no("flag");
        assert_eq!(
            codec.sql_declaration("active", DatabaseType::Sqlite),
            "TEXT CHECK(active IN ('y', 'n'))"
        );
        assert_eq!(
            codec.sql_declaration("active", DatabaseType::Mysql),
            "ENUM('y', 'n')"
        );
    }
}
