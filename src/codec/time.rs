use chrono::NaiveTime;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, conversion_failed, text_of};

const STORAGE_FORMAT: &str = "%H:%M:%S";

/// Time of day stored as `HH:MM:SS` text.
///
/// Fractional seconds are accepted when decoding and dropped when encoding. A full
/// timestamp decodes to its time part.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeCodec;

impl ValueCodec for TimeCodec {
    type Value = NaiveTime;

    fn name(&self) -> &str {
        "time"
    }

    fn decode(&self, raw: &RowValues) -> Result<NaiveTime, SqlReconnectError> {
        if let RowValues::Timestamp(naive) = raw {
            return Ok(naive.time());
        }
        let text = text_of(raw, self.name())?.trim();
        ["%H:%M:%S%.f", STORAGE_FORMAT, "%H:%M"]
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
            .or_else(|| raw.as_timestamp().map(|naive| naive.time()))
            .ok_or_else(|| conversion_failed(raw, self.name()))
    }

    fn encode(&self, value: &NaiveTime) -> Result<RowValues, SqlReconnectError> {
        Ok(RowValues::Text(value.format(STORAGE_FORMAT).to_string()))
    }
}
