//! Content-IDs for embedded objects.
//!
//! Embedded objects (inline images and the like) are referenced from an HTML
//! body as `cid:<content-id>`.

use crate::error::{Error, Result};
use crate::types::syntax::{is_dot_atom, is_hostname};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Content-ID of an embedded object, stored without angle brackets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Returns the bare Content-ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the URL used to reference the object from HTML (`cid:...`).
    #[must_use]
    pub fn url(&self) -> String {
        format!("cid:{}", self.0)
    }

    /// Returns the value for a `Content-ID` header (`<...>`).
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("<{}>", self.0)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentId {
    type Error = Error;

    fn try_from(cid: String) -> Result<Self> {
        match cid.split_once('@') {
            Some((left, right)) if is_dot_atom(left) && is_hostname(right) => Ok(Self(cid)),
            _ => Err(Error::InvalidHeader(format!("Invalid Content-ID {cid:?}"))),
        }
    }
}

impl From<ContentId> for String {
    fn from(cid: ContentId) -> Self {
        cid.0
    }
}

/// Number of generators created in this process.
static INSTANCES: AtomicU64 = AtomicU64::new(0);

/// Returns a stamp distinguishing this generator from every other one.
///
/// Combines the creation time with a process-wide generator sequence.
pub(crate) fn instance_stamp() -> String {
    let now = Utc::now();
    let seq = INSTANCES.fetch_add(1, Ordering::Relaxed);
    format!(
        "{:x}{:08x}-{seq:x}",
        now.timestamp(),
        now.timestamp_subsec_nanos()
    )
}

/// Generator for unique Content-IDs.
///
/// IDs have the form `<sequence>.<instance>.<pid>@<domain>` where `instance`
/// identifies the generator, which keeps IDs from separate generators apart.
/// A domain that is not a valid host name is replaced by `localhost`.
#[derive(Debug)]
pub struct ContentIdGenerator {
    counter: AtomicU64,
    instance: String,
    domain: String,
}

impl ContentIdGenerator {
    /// Creates a generator for the given domain.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        let mut domain = domain.into();
        if !is_hostname(&domain) {
            tracing::warn!(%domain, "unusable content id domain, using localhost");
            domain = "localhost".to_string();
        }

        Self {
            counter: AtomicU64::new(0),
            instance: instance_stamp(),
            domain,
        }
    }

    /// Generates the next Content-ID.
    #[must_use]
    pub fn next(&self) -> ContentId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let cid = format!(
            "{n}.{}.{}@{}",
            self.instance,
            std::process::id(),
            self.domain
        );
        tracing::trace!(%cid, "generated content id");
        ContentId(cid)
    }

    /// Returns how many IDs have been generated.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
