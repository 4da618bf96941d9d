use chrono::FixedOffset;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, text_of};

/// UTC offsets stored as `+HH:MM` text.
///
/// Decoding also accepts `UTC`, `GMT`, `Z`, `+HHMM` and `+HH`. Named regions such as
/// `Europe/Paris` are rejected: their offset depends on the date, so they cannot be
/// reduced to one [`FixedOffset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeZoneCodec;

fn parse_offset(text: &str) -> Option<FixedOffset> {
    if ["UTC", "GMT", "Z"].iter().any(|z| text.eq_ignore_ascii_case(z)) {
        return FixedOffset::east_opt(0);
    }
    let (sign, digits) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    if hours.len() > 2 || minutes.len() > 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl ValueCodec for TimeZoneCodec {
    type Value = FixedOffset;

    fn name(&self) -> &str {
        "timezone"
    }

    fn decode(&self, raw: &RowValues) -> Result<FixedOffset, SqlReconnectError> {
        let text = text_of(raw, self.name())?.trim();
        parse_offset(text).ok_or_else(|| {
            SqlReconnectError::ParameterError(format!("'{text}' is not a UTC offset"))
        })
    }

    fn encode(&self, value: &FixedOffset) -> Result<RowValues, SqlReconnectError> {
        Ok(RowValues::Text(value.to_string()))
    }
}
