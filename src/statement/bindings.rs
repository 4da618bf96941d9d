use std::sync::{Arc, Mutex};

use crate::driver::{DriverStatement, apply_length};
use crate::error::SqlReconnectError;
use crate::types::{ParamKey, ParamType, RowValues};

/// A value bound by reference: the statement reads it again every time it executes, so
/// callers can change it between executions.
#[derive(Debug, Clone)]
pub struct ParamRef(Arc<Mutex<RowValues>>);

impl ParamRef {
    #[must_use]
    pub fn new(value: RowValues) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    pub fn set(&self, value: RowValues) {
        let mut guard = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = value;
    }

    #[must_use]
    pub fn get(&self) -> RowValues {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug, Clone)]
pub enum BoundValue {
    Value(RowValues),
    Reference(ParamRef),
}

/// One recorded binding.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: BoundValue,
    pub param_type: Option<ParamType>,
    pub length: Option<usize>,
}

impl Binding {
    /// The value the driver should see right now: coerced to the declared type and cut
    /// to the declared length.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when coercion fails.
    pub fn current(&self) -> Result<RowValues, SqlReconnectError> {
        let raw = match &self.value {
            BoundValue::Value(value) => value.clone(),
            BoundValue::Reference(param) => param.get(),
        };
        let coerced = match self.param_type {
            Some(ty) => ty.coerce(raw)?,
            None => raw,
        };
        Ok(apply_length(coerced, self.length))
    }

    #[must_use]
    pub fn is_by_reference(&self) -> bool {
        matches!(self.value, BoundValue::Reference(_))
    }
}

/// Bindings in the order they were first made. Rebinding a key replaces its entry
/// without moving it.
#[derive(Debug, Clone, Default)]
pub struct BoundParams {
    entries: Vec<(ParamKey, Binding)>,
}

impl BoundParams {
    pub fn record(&mut self, key: ParamKey, binding: Binding) {
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = binding;
        } else {
            self.entries.push((key, binding));
        }
    }

    /// Re-apply every binding, in original order, to a freshly prepared statement.
    ///
    /// # Errors
    /// Returns the first bind error.
    pub fn replay<S: DriverStatement>(&self, statement: &mut S) -> Result<(), SqlReconnectError> {
        for (key, binding) in &self.entries {
            statement.bind(key, binding.current()?, binding.length)?;
        }
        Ok(())
    }

    /// Push the current value of every by-reference binding to `statement`.
    ///
    /// # Errors
    /// Returns the first bind error.
    pub fn refresh_references<S: DriverStatement>(
        &self,
        statement: &mut S,
    ) -> Result<(), SqlReconnectError> {
        for (key, binding) in self.entries.iter().filter(|(_, b)| b.is_by_reference()) {
            statement.bind(key, binding.current()?, binding.length)?;
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &Binding)> {
        self.entries.iter().map(|(k, b)| (k, b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<(ParamKey, RowValues)>,
    }

    impl DriverStatement for Recorder {
        fn sql(&self) -> &str {
            "SELECT :p1, :p2"
        }

        fn bind(
            &mut self,
            key: &ParamKey,
            value: RowValues,
            _length: Option<usize>,
        ) -> Result<(), SqlReconnectError> {
            self.seen.push((key.clone(), value));
            Ok(())
        }
    }

    fn by_value(value: RowValues) -> Binding {
        Binding {
            value: BoundValue::Value(value),
            param_type: None,
            length: None,
        }
    }

    #[test]
    fn replay_keeps_first_binding_position() {
        let mut params = BoundParams::default();
        params.record(ParamKey::named("p1"), by_value(RowValues::Text("a".into())));
        params.record(ParamKey::named("p2"), by_value(RowValues::Int(5)));
        params.record(ParamKey::named("p1"), by_value(RowValues::Text("b".into())));

        let mut stmt = Recorder::default();
        params.replay(&mut stmt).unwrap();
        assert_eq!(
            stmt.seen,
            vec![
                (ParamKey::named("p1"), RowValues::Text("b".into())),
                (ParamKey::named("p2"), RowValues::Int(5)),
            ]
        );
    }

    #[test]
    fn references_are_read_at_refresh_time() {
        let live = ParamRef::new(RowValues::Int(1));
        let mut params = BoundParams::default();
        params.record(ParamKey::Position(1), by_value(RowValues::Int(10)));
        params.record(
            ParamKey::Position(2),
            Binding {
                value: BoundValue::Reference(live.clone()),
                param_type: Some(ParamType::String),
                length: Some(1),
            },
        );
        live.set(RowValues::Int(42));

        let mut stmt = Recorder::default();
        params.refresh_references(&mut stmt).unwrap();
        assert_eq!(
            stmt.seen,
            vec![(ParamKey::Position(2), RowValues::Text("4".into()))]
        );
    }
}
