//! Custom message headers.

use crate::error::{Error, Result};
use crate::types::syntax::has_control;
use serde::{Deserialize, Serialize};

/// Headers the message manages itself and callers may not add.
pub const RESERVED_HEADERS: &[&str] = &[
    "To",
    "Cc",
    "Bcc",
    "From",
    "Sender",
    "Reply-To",
    "Disposition-Notification-To",
    "Subject",
    "Message-ID",
    "Date",
    "MIME-Version",
    "Content-Type",
    "Content-Transfer-Encoding",
    "Content-ID",
    "Return-Path",
];

/// Returns true if `name` is a reserved header (case-insensitive).
#[must_use]
pub fn is_reserved_header(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name.trim()))
}

/// Caller-supplied header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "HeaderFields")]
pub struct CustomHeader {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl CustomHeader {
    /// Creates a validated custom header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the name is not a valid field name
    /// or the value contains a control character other than tab, and [`Error::ReservedHeader`] if the
    /// name is reserved.
    pub fn new(name: &str, value: &str) -> Result<Self> {
        // RFC 5322 field name: printable US-ASCII except colon.
        if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b) && b != b':') {
            return Err(Error::InvalidHeader(format!("Invalid header name {name:?}")));
        }

        if has_control(value) {
            return Err(Error::InvalidHeader(format!(
                "Value of header {name} contains a control character"
            )));
        }

        if is_reserved_header(name) {
            return Err(Error::ReservedHeader(name.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            value: value.to_string(),
        })
    }
}

/// Unvalidated shape of a serialized [`CustomHeader`].
#[derive(Deserialize)]
struct HeaderFields {
    name: String,
    value: String,
}

impl TryFrom<HeaderFields> for CustomHeader {
    type Error = Error;

    fn try_from(fields: HeaderFields) -> Result<Self> {
        Self::new(&fields.name, &fields.value)
    }
}
