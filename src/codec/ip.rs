use std::net::IpAddr;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, text_of};

/// IPv4 and IPv6 addresses stored in their textual form.
#[derive(Debug, Clone, Copy, Default)]
pub struct IpAddressCodec;

impl ValueCodec for IpAddressCodec {
    type Value = IpAddr;

    fn name(&self) -> &str {
        "ip"
    }

    fn decode(&self, raw: &RowValues) -> Result<IpAddr, SqlReconnectError> {
        let text = text_of(raw, self.name())?;
        text.trim().parse().map_err(|e| {
            SqlReconnectError::ParameterError(format!("'{text}' is not a valid IP address: {e}"))
        })
    }

    fn encode(&self, value: &IpAddr) -> Result<RowValues, SqlReconnectError> {
        Ok(RowValues::Text(value.to_string()))
    }
}
