//! Email address types.

use crate::error::{Error, Result};
use crate::types::UserId;
use crate::types::syntax::{has_control, is_dot_atom, is_hostname};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role an address plays in a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressRole {
    /// Primary recipient.
    To,
    /// Carbon-copy recipient.
    Cc,
    /// Blind carbon-copy recipient.
    Bcc,
    /// Author shown to the reader.
    From,
    /// Address replies should go to.
    ReplyTo,
    /// Address a read receipt is requested for (`Disposition-Notification-To`).
    ReadReceiptTo,
    /// Agent responsible for the actual transmission.
    Sender,
}

impl AddressRole {
    /// Returns the header name used for this role.
    #[must_use]
    pub const fn header_name(self) -> &'static str {
        match self {
            Self::To => "To",
            Self::Cc => "Cc",
            Self::Bcc => "Bcc",
            Self::From => "From",
            Self::ReplyTo => "Reply-To",
            Self::ReadReceiptTo => "Disposition-Notification-To",
            Self::Sender => "Sender",
        }
    }

    /// Returns true for roles that receive the message (To, Cc, Bcc).
    #[must_use]
    pub const fn is_recipient(self) -> bool {
        matches!(self, Self::To | Self::Cc | Self::Bcc)
    }
}

impl fmt::Display for AddressRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_name())
    }
}

/// Mailbox with an optional directory user and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AddressFields")]
pub struct Address {
    /// User in the external directory, if any.
    pub user_id: Option<UserId>,
    /// Email address (`local@domain`).
    pub address: String,
    /// Display name, if any.
    pub display_name: Option<String>,
}

impl Address {
    /// Creates a validated address.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the mailbox is malformed or the
    /// display name contains a control character.
    pub fn new(
        user_id: Option<UserId>,
        address: impl Into<String>,
        display_name: Option<&str>,
    ) -> Result<Self> {
        let address = address.into();
        Self::validate(&address)?;

        if let Some(name) = display_name
            && has_control(name)
        {
            return Err(Error::InvalidAddress(format!(
                "Display name for {address} contains a control character"
            )));
        }

        Ok(Self {
            user_id,
            address,
            display_name: display_name.map(str::to_string),
        })
    }

    /// Returns the bare mailbox.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.address
    }

    /// Returns the domain part of the mailbox.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.address
            .rsplit_once('@')
            .map_or("", |(_, domain)| domain)
    }

    /// Validates a mailbox (well-formedness only, no DNS or deliverability checks).
    ///
    /// The local part must be `dot-atom-text` and the domain a host name of
    /// letter-digit-hyphen labels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] describing the first problem found.
    pub fn validate(addr: &str) -> Result<()> {
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Address cannot be empty".into()));
        }

        if let Some(c) = addr
            .chars()
            .find(|&c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ','))
        {
            return Err(Error::InvalidAddress(format!(
                "Address {addr:?} contains illegal character {c:?}"
            )));
        }

        let parts: Vec<&str> = addr.split('@').collect();
        if parts.len() != 2 {
            return Err(Error::InvalidAddress(format!(
                "Address {addr:?} must have exactly one @"
            )));
        }

        let (local, domain) = (parts[0], parts[1]);
        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "Local and domain parts of {addr:?} cannot be empty"
            )));
        }

        if !is_dot_atom(local) {
            return Err(Error::InvalidAddress(format!(
                "Local part of {addr:?} is not a valid atom"
            )));
        }

        if !is_hostname(domain) {
            return Err(Error::InvalidAddress(format!(
                "Domain of {addr:?} is not a valid host name"
            )));
        }

        Ok(())
    }

    /// Formats the address for use in a header (`"Name" <local@domain>`).
    #[must_use]
    pub fn to_header_value(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => {
                format!("{} <{}>", quote_display_name(name), self.address)
            }
            _ => format!("<{}>", self.address),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header_value())
    }
}

/// Unvalidated shape of a serialized [`Address`].
#[derive(Deserialize)]
struct AddressFields {
    user_id: Option<UserId>,
    address: String,
    display_name: Option<String>,
}

impl TryFrom<AddressFields> for Address {
    type Error = Error;

    fn try_from(fields: AddressFields) -> Result<Self> {
        Self::new(
            fields.user_id,
            fields.address,
            fields.display_name.as_deref(),
        )
    }
}

/// Quotes a display name when it contains RFC 5322 specials.
fn quote_display_name(name: &str) -> String {
    const SPECIALS: &str = "()<>[]:;@\\,.\"";

    if name.contains(|c: char| SPECIALS.contains(c)) {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_address() {
        let addr = Address::new(None, "user@example.com", None).unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.domain(), "example.com");
        assert!(addr.user_id.is_none());
    }

    #[test]
    fn test_address_keeps_user_and_name() {
        let addr = Address::new(Some(UserId::new(12)), "john@example.com", Some("John")).unwrap();
        assert_eq!(addr.user_id, Some(UserId::new(12)));
        assert_eq!(addr.display_name.as_deref(), Some("John"));
    }

    #[test]
    fn test_invalid_address_no_at() {
        assert!(matches!(
            Address::validate("userexample.com"),
            Err(Error::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_invalid_address_empty() {
        assert!(Address::validate("").is_err());
    }

    #[test]
    fn test_invalid_address_two_ats() {
        assert!(Address::validate("a@b@example.com").is_err());
    }

    #[test]
    fn test_invalid_address_empty_parts() {
        assert!(Address::validate("@example.com").is_err());
        assert!(Address::validate("user@").is_err());
        assert!(Address::validate("user@example..com").is_err());
    }

    #[test]
    fn test_invalid_address_illegal_characters() {
        assert!(Address::validate("us er@example.com").is_err());
        assert!(Address::validate("<user@example.com>").is_err());
        assert!(Address::validate("a@example.com,b@example.com").is_err());
        assert!(Address::validate("user@example.com\r\nBcc: x@evil.test").is_err());
        assert!(Address::validate("a(b@example.com").is_err());
        assert!(Address::validate("a;b@example.com").is_err());
        assert!(Address::validate("\"x@example.com").is_err());
        assert!(Address::validate("a@exa[m]ple.com").is_err());
        assert!(Address::validate(".a@example.com").is_err());
        assert!(Address::validate("a..b@example.com").is_err());
        assert!(Address::validate("a@-example.com").is_err());
        assert!(Address::validate("a@exam_ple.com").is_err());
    }

    #[test]
    fn test_valid_address_forms() {
        assert!(Address::validate("first.last+tag@mail-1.example.com").is_ok());
        assert!(Address::validate("o'brien@example.ie").is_ok());
        assert!(Address::validate("root@localhost").is_ok());
    }

    #[test]
    fn test_display_name_control_characters_rejected() {
        let result = Address::new(None, "user@example.com", Some("Evil\r\nBcc: x@evil.test"));
        assert!(matches!(result, Err(Error::InvalidAddress(_))));

        for name in ["nul\0byte", "bell\x07", "esc\x1b[0m"] {
            assert!(
                Address::new(None, "user@example.com", Some(name)).is_err(),
                "{name:?} accepted"
            );
        }
        assert!(Address::new(None, "user@example.com", Some("Tab\tName")).is_ok());
    }

    #[test]
    fn test_deserialize_validates() {
        let addr: Address = serde_json::from_str(
            r#"{"user_id": 7, "address": "a@example.com", "display_name": "Alice"}"#,
        )
        .unwrap();
        assert_eq!(addr.user_id, Some(UserId::new(7)));
        assert_eq!(addr.to_header_value(), "Alice <a@example.com>");

        let injected = r#"{"user_id": null, "address": "a@example.com", "display_name": "Evil\r\nBcc: x@evil.test"}"#;
        assert!(serde_json::from_str::<Address>(injected).is_err());

        let malformed = r#"{"user_id": null, "address": "a(b@example.com", "display_name": null}"#;
        assert!(serde_json::from_str::<Address>(malformed).is_err());
    }

    #[test]
    fn test_header_value() {
        let plain = Address::new(None, "a@example.com", None).unwrap();
        assert_eq!(plain.to_header_value(), "<a@example.com>");

        let named = Address::new(None, "a@example.com", Some("Alice")).unwrap();
        assert_eq!(named.to_header_value(), "Alice <a@example.com>");

        let special = Address::new(None, "a@example.com", Some("Doe, \"Al\"")).unwrap();
        assert_eq!(special.to_header_value(), "\"Doe, \\\"Al\\\"\" <a@example.com>");
    }

    #[test]
    fn test_role_header_names() {
        assert_eq!(AddressRole::ReplyTo.header_name(), "Reply-To");
        assert_eq!(
            AddressRole::ReadReceiptTo.header_name(),
            "Disposition-Notification-To"
        );
        assert!(AddressRole::Bcc.is_recipient());
        assert!(!AddressRole::From.is_recipient());
    }
}
