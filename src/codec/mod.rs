//! Mapping between application values and stored column values.
//!
//! Codecs sit beside the retry engine, not inside it: a caller encodes a value into a
//! [`RowValues`] before binding it and decodes a fetched column with
//! [`CustomDbRow::get_decoded`](crate::CustomDbRow::get_decoded).

mod email;
mod enumeration;
mod ip;
mod json;
mod point;
mod time;
mod timestamp;
mod timezone;

pub use email::{EmailAddress, EmailAddressCodec};
pub use enumeration::EnumCodec;
pub use ip::IpAddressCodec;
pub use json::JsonCodec;
pub use point::{Point, PointCodec};
pub use time::TimeCodec;
pub use timestamp::{CURRENT_TIMESTAMP, TimestampCodec};
pub use timezone::TimeZoneCodec;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

pub trait ValueCodec: Send + Sync {
    type Value;

    /// Short name used in conversion error messages.
    fn name(&self) -> &str;

    /// Convert a stored value. `NULL` is an error; use [`decode_nullable`](Self::decode_nullable)
    /// for nullable columns.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when the stored value does not parse.
    fn decode(&self, raw: &RowValues) -> Result<Self::Value, SqlReconnectError>;

    /// Convert an application value into something a driver can bind.
    ///
    /// # Errors
    /// Returns [`SqlReconnectError::ParameterError`] when the value is not valid for the
    /// column.
    fn encode(&self, value: &Self::Value) -> Result<RowValues, SqlReconnectError>;

    /// # Errors
    /// Same as [`decode`](Self::decode), minus the `NULL` case.
    fn decode_nullable(&self, raw: &RowValues) -> Result<Option<Self::Value>, SqlReconnectError> {
        if raw.is_null() {
            return Ok(None);
        }
        self.decode(raw).map(Some)
    }

    /// # Errors
    /// Same as [`encode`](Self::encode).
    fn encode_nullable(&self, value: Option<&Self::Value>) -> Result<RowValues, SqlReconnectError> {
        value.map_or(Ok(RowValues::Null), |v| self.encode(v))
    }
}

pub(crate) fn conversion_failed(raw: &RowValues, codec: &str) -> SqlReconnectError {
    SqlReconnectError::ParameterError(format!(
        "could not convert database value {raw:?} to {codec}"
    ))
}

/// Text content of a stored value, accepting UTF-8 blobs.
pub(crate) fn text_of<'a>(raw: &'a RowValues, codec: &str) -> Result<&'a str, SqlReconnectError> {
    match raw {
        RowValues::Text(s) => Ok(s),
        RowValues::Blob(b) => std::str::from_utf8(b).map_err(|_| conversion_failed(raw, codec)),
        other => Err(conversion_failed(other, codec)),
    }
}
