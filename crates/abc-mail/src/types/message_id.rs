//! Message-ID values.

use crate::error::{Error, Result};
use crate::types::syntax::{is_domain_literal, is_dot_atom};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A well-formed Message-ID, stored with its angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageId(String);

impl MessageId {
    /// Parses a Message-ID with or without surrounding angle brackets.
    ///
    /// The left side must be `dot-atom-text` and the right side either
    /// `dot-atom-text` or a `[...]` literal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessageId`] if the ID is empty, has unbalanced
    /// brackets, or is not of the form `id-left@id-right`.
    pub fn parse(id: &str) -> Result<Self> {
        let inner = match (id.strip_prefix('<'), id.ends_with('>')) {
            (Some(rest), true) => rest.strip_suffix('>').unwrap_or_default(),
            (None, false) => id,
            _ => {
                return Err(Error::InvalidMessageId(format!(
                    "Unbalanced angle brackets in {id:?}"
                )));
            }
        };

        if inner.is_empty() {
            return Err(Error::InvalidMessageId("Message-ID cannot be empty".into()));
        }

        let Some((left, right)) = inner.split_once('@') else {
            return Err(Error::InvalidMessageId(format!(
                "Message-ID {id:?} must have the form left@right"
            )));
        };

        if !is_dot_atom(left) || !(is_dot_atom(right) || is_domain_literal(right)) {
            return Err(Error::InvalidMessageId(format!(
                "Message-ID {id:?} contains illegal characters"
            )));
        }

        Ok(Self(format!("<{inner}>")))
    }

    /// Wraps an ID that is well-formed by construction.
    pub(crate) fn new_unchecked(inner: &str) -> Self {
        Self(format!("<{inner}>"))
    }

    /// Returns the ID including angle brackets.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the ID without angle brackets.
    #[must_use]
    pub fn bare(&self) -> &str {
        self.0
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(&self.0)
    }
}

impl TryFrom<String> for MessageId {
    type Error = Error;

    fn try_from(id: String) -> Result<Self> {
        Self::parse(&id)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare() {
        let id = MessageId::parse("1234.abcd@example.com").unwrap();
        assert_eq!(id.as_str(), "<1234.abcd@example.com>");
        assert_eq!(id.bare(), "1234.abcd@example.com");
    }

    #[test]
    fn test_parse_bracketed() {
        let id = MessageId::parse("<1234@example.com>").unwrap();
        assert_eq!(id.to_string(), "<1234@example.com>");
    }

    #[test]
    fn test_parse_invalid() {
        for id in [
            "",
            "<>",
            "no-at-sign",
            "@example.com",
            "left@",
            "a@b@c",
            "<unbalanced@example.com",
            "unbalanced@example.com>",
            "with space@example.com",
            "line\r\nbreak@example.com",
            "nested<x>@example.com",
            "ünïcode@example.com",
            "a(b)@example.com",
            "\"quoted\"@example.com",
            "a,b@example.com",
            "a;b@example.com",
            "a:b@example.com",
            "a\\b@example.com",
            "[literal]@example.com",
            "left@exa(mple).com",
            "dots..here@example.com",
            ".lead@example.com",
            "nul\0@example.com",
        ] {
            assert!(
                matches!(MessageId::parse(id), Err(Error::InvalidMessageId(_))),
                "{id:?} accepted"
            );
        }
    }

    #[test]
    fn test_parse_domain_literal() {
        let id = MessageId::parse("1234@[192.0.2.1]").unwrap();
        assert_eq!(id.bare(), "1234@[192.0.2.1]");
    }

    #[test]
    fn test_deserialize_validates() {
        let id: MessageId = serde_json::from_str("\"<1@example.com>\"").unwrap();
        assert_eq!(id.bare(), "1@example.com");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"<1@example.com>\"");

        assert!(serde_json::from_str::<MessageId>("\"\"").is_err());
        assert!(serde_json::from_str::<MessageId>("\"a(b)@example.com\"").is_err());
    }
}
