use serde_json::Value as JsonValue;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, conversion_failed, text_of};

/// JSON documents stored as text. An empty string reads back as JSON `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ValueCodec for JsonCodec {
    type Value = JsonValue;

    fn name(&self) -> &str {
        "json"
    }

    fn decode(&self, raw: &RowValues) -> Result<JsonValue, SqlReconnectError> {
        if let RowValues::JSON(value) = raw {
            return Ok(value.clone());
        }
        let text = text_of(raw, self.name())?;
        if text.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_str(text).map_err(|_| conversion_failed(raw, self.name()))
    }

    fn encode(&self, value: &JsonValue) -> Result<RowValues, SqlReconnectError> {
        serde_json::to_string(value)
            .map(RowValues::Text)
            .map_err(|e| SqlReconnectError::ParameterError(format!("json encode failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_text_and_blob() {
        let codec = JsonCodec;
        assert_eq!(
            codec.decode(&RowValues::Text(r#"{"a":[1,2]}"#.into())).unwrap(),
            json!({"a": [1, 2]})
        );
        assert_eq!(
            codec.decode(&RowValues::Blob(b"true".to_vec())).unwrap(),
            json!(true)
        );
        assert_eq!(codec.decode(&RowValues::Text(String::new())).unwrap(), JsonValue::Null);
        assert!(codec.decode(&RowValues::Text("{".into())).is_err());
    }

    #[test]
    fn encodes_compact_text() {
        assert_eq!(
            JsonCodec.encode(&json!({"k": "v"})).unwrap(),
            RowValues::Text(r#"{"k":"v"}"#.into())
        );
    }
}
