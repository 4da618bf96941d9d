use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::SqlReconnectError;
use crate::types::RowValues;

use super::{ValueCodec, text_of};

lazy_static! {
    static ref LOCAL_PART: Regex =
        Regex::new(r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]{1,64}$").expect("local part pattern");
    // dot-separated labels, 1-63 characters, no leading or trailing hyphen
    static ref HOSTNAME: Regex = Regex::new(concat!(
        r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?",
        r"(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    ))
    .expect("hostname pattern");
}

/// A validated `local-part@hostname` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress {
    local_part: String,
    domain: String,
}

impl EmailAddress {
    #[must_use]
    pub fn local_part(&self) -> &str {
        &self.local_part
    }

    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

fn invalid(message: impl Into<String>) -> SqlReconnectError {
    SqlReconnectError::ParameterError(message.into())
}

fn not_an_address(email: &str) -> SqlReconnectError {
    invalid(format!(
        "the input \"{email}\" is not a valid email address; \
         use the basic format local-part@hostname"
    ))
}

impl FromStr for EmailAddress {
    type Err = SqlReconnectError;

    fn from_str(email: &str) -> Result<Self, Self::Err> {
        if email.is_empty() {
            return Err(invalid("email must be a valid email address"));
        }
        if email.contains(['\r', '\n']) {
            return Err(invalid("CRLF injection detected"));
        }
        let Some((local_part, domain)) = email.rsplit_once('@') else {
            return Err(not_an_address(email));
        };
        if email.contains("..") || local_part.is_empty() || domain.is_empty() {
            return Err(not_an_address(email));
        }
        if !LOCAL_PART.is_match(local_part) {
            return Err(invalid(format!("'{local_part}' is not a valid local part")));
        }
        if domain.len() > 253 || !HOSTNAME.is_match(domain) {
            return Err(invalid(format!("'{domain}' is not a valid hostname")));
        }
        Ok(Self {
            local_part: local_part.to_string(),
            domain: domain.to_string(),
        })
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

/// Email addresses stored as text, validated on the way in and out.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailAddressCodec;

impl EmailAddressCodec {
    /// Column length used when none is declared.
    pub const DEFAULT_LENGTH: usize = 255;
}

impl ValueCodec for EmailAddressCodec {
    type Value = EmailAddress;

    fn name(&self) -> &str {
        "emailAddress"
    }

    fn decode(&self, raw: &RowValues) -> Result<EmailAddress, SqlReconnectError> {
        text_of(raw, self.name())?.parse()
    }

    fn encode(&self, value: &EmailAddress) -> Result<RowValues, SqlReconnectError> {
        Ok(RowValues::Text(value.to_string()))
    }
}
