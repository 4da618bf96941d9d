use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, Utc};

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, conversion_failed, text_of};

/// Literal that encodes as "now".
pub const CURRENT_TIMESTAMP: &str = "CURRENT_TIMESTAMP";

const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamps stored without zone information, interpreted in one fixed offset.
///
/// The offset is chosen when the codec is built and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampCodec {
    offset: FixedOffset,
}

impl Default for TimestampCodec {
    fn default() -> Self {
        Self::utc()
    }
}

impl TimestampCodec {
    #[must_use]
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    #[must_use]
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// The host's current UTC offset, captured once.
    #[must_use]
    pub fn local() -> Self {
        Self {
            offset: *Local::now().offset(),
        }
    }

    #[must_use]
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Encode a textual timestamp. [`CURRENT_TIMESTAMP`] means the current time.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when `text` does not parse.
    pub fn encode_str(&self, text: &str) -> Result<RowValues, SqlReconnectError> {
        if text == CURRENT_TIMESTAMP {
            return self.encode(&Utc::now().with_timezone(&self.offset));
        }
        let parsed = self.decode(&RowValues::Text(text.to_string()))?;
        self.encode(&parsed)
    }

    fn from_naive(&self, naive: NaiveDateTime) -> DateTime<FixedOffset> {
        DateTime::from_naive_utc_and_offset(naive - self.offset, self.offset)
    }
}

impl ValueCodec for TimestampCodec {
    type Value = DateTime<FixedOffset>;

    fn name(&self) -> &str {
        "timestamp"
    }

    fn decode(&self, raw: &RowValues) -> Result<DateTime<FixedOffset>, SqlReconnectError> {
        if let RowValues::Timestamp(naive) = raw {
            return Ok(self.from_naive(*naive));
        }
        let text = text_of(raw, self.name())?;
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, STORAGE_FORMAT) {
            return Ok(self.from_naive(naive));
        }
        if let Ok(with_zone) = DateTime::parse_from_rfc3339(text) {
            return Ok(with_zone.with_timezone(&self.offset));
        }
        raw.as_timestamp()
            .map(|naive| self.from_naive(naive))
            .ok_or_else(|| conversion_failed(raw, self.name()))
    }

    fn encode(&self, value: &DateTime<FixedOffset>) -> Result<RowValues, SqlReconnectError> {
        Ok(RowValues::Timestamp(
            value.with_timezone(&self.offset).naive_local(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn naive(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn encodes_in_the_fixed_offset() {
        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let codec = TimestampCodec::utc();
        let at_noon_plus_two = plus_two.from_local_datetime(&naive(12)).unwrap();
        assert_eq!(
            codec.encode(&at_noon_plus_two).unwrap(),
            RowValues::Timestamp(naive(10))
        );
    }

    #[test]
    fn decodes_storage_format_and_rfc3339() {
        let codec = TimestampCodec::utc();
        let stored = codec
            .decode(&RowValues::Text("2024-03-01 10:00:00".into()))
            .unwrap();
        assert_eq!(stored.naive_utc(), naive(10));

        let zoned = codec
            .decode(&RowValues::Text("2024-03-01T12:00:00+02:00".into()))
            .unwrap();
        assert_eq!(zoned.naive_local(), naive(10));
        assert!(codec.decode(&RowValues::Text("yesterday".into())).is_err());
    }

    #[test]
    fn current_timestamp_literal_is_now() {
        let codec = TimestampCodec::utc();
        let before = Utc::now().naive_utc();
        let RowValues::Timestamp(encoded) = codec.encode_str(CURRENT_TIMESTAMP).unwrap() else {
            panic!("expected a timestamp");
        };
        assert!(encoded >= before - chrono::Duration::seconds(1));
    }
}
