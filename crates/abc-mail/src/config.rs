//! Configuration for message factories.

use crate::error::{Error, Result};
use crate::types::Address;
use crate::types::syntax::is_hostname;
use serde::{Deserialize, Serialize};

/// Settings shared by all messages created by one factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Domain used on the right-hand side of generated Message-IDs.
    pub domain: String,
    /// Domain used for generated Content-IDs (defaults to `domain`).
    pub cid_domain: Option<String>,
    /// When set, every message is delivered to this address only.
    ///
    /// Headers are left untouched so the redirected mail still shows the
    /// intended recipients.
    pub sandbox_recipient: Option<String>,
    /// Fill in missing display names from the user directory.
    pub resolve_display_names: bool,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            domain: "localhost".to_string(),
            cid_domain: None,
            sandbox_recipient: None,
            resolve_display_names: true,
        }
    }
}

impl MailConfig {
    /// Creates a configuration for the given domain.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ..Self::default()
        }
    }

    /// Redirects all deliveries to `recipient`.
    #[must_use]
    pub fn with_sandbox_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.sandbox_recipient = Some(recipient.into());
        self
    }

    /// Returns the domain for Content-IDs.
    #[must_use]
    pub fn cid_domain(&self) -> &str {
        self.cid_domain.as_deref().unwrap_or(&self.domain)
    }

    /// Returns true if deliveries are redirected.
    #[must_use]
    pub const fn is_sandbox(&self) -> bool {
        self.sandbox_recipient.is_some()
    }

    /// Parses and validates a JSON configuration.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed or the settings are invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.domain.trim().is_empty() {
            return Err(Error::Config("domain is required".into()));
        }

        if !is_hostname(&self.domain) {
            return Err(Error::Config(format!("invalid domain {:?}", self.domain)));
        }

        if let Some(cid_domain) = &self.cid_domain {
            if cid_domain.trim().is_empty() {
                return Err(Error::Config("cid_domain cannot be empty".into()));
            }
            if !is_hostname(cid_domain) {
                return Err(Error::Config(format!("invalid cid_domain {cid_domain:?}")));
            }
        }

        if let Some(recipient) = &self.sandbox_recipient {
            Address::validate(recipient)
                .map_err(|e| Error::Config(format!("sandbox_recipient: {e}")))?;
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let config = MailConfig::default();
        assert_eq!(config.domain, "localhost");
        assert_eq!(config.cid_domain(), "localhost");
        assert!(!config.is_sandbox());
        assert!(config.resolve_display_names);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = MailConfig::from_json(r#"{"domain": "example.com"}"#).unwrap();
        assert_eq!(config.domain, "example.com");
        assert!(config.resolve_display_names);
    }

    #[test]
    fn test_from_json_full() {
        let config = MailConfig::from_json(
            r#"{
                "domain": "example.com",
                "cid_domain": "cid.example.com",
                "sandbox_recipient": "qa@example.com",
                "resolve_display_names": false
            }"#,
        )
        .unwrap();
        assert_eq!(config.cid_domain(), "cid.example.com");
        assert_eq!(config.sandbox_recipient.as_deref(), Some("qa@example.com"));
        assert!(config.is_sandbox());
        assert!(!config.resolve_display_names);
    }

    #[test]
    fn test_from_json_malformed() {
        assert!(matches!(
            MailConfig::from_json("{ not json"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        assert!(MailConfig::new("").validate().is_err());
        assert!(MailConfig::new("bad domain").validate().is_err());
        assert!(
            MailConfig::new("example.com")
                .with_sandbox_recipient("not-an-address")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_bad_cid_domain() {
        for cid_domain in ["", "bad domain", "cid@example.com", "<cid.example.com>"] {
            let config = MailConfig {
                cid_domain: Some(cid_domain.to_string()),
                ..MailConfig::new("example.com")
            };
            assert!(
                matches!(config.validate(), Err(Error::Config(_))),
                "{cid_domain:?} accepted"
            );
        }
    }

    #[test]
    fn test_roundtrip_serialization() {
        let config = MailConfig::new("example.com").with_sandbox_recipient("qa@example.com");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(MailConfig::from_json(&json).unwrap(), config);
    }
}
