//! Collaborators a message relies on for storage, lookup and delivery.
//!
//! The message itself performs no I/O. Blob contents, user records and the
//! actual transmission are supplied through these traits, so any storage
//! engine or mail transport can be plugged in. In-memory implementations live
//! in [`crate::memory`].

use crate::error::Result;
use crate::outgoing::OutgoingMessage;
use crate::types::{BlobId, DeliveryId, MessageId, UserId, instance_stamp};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Binary object resolved from a blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Blob ID.
    pub id: BlobId,
    /// Raw content.
    pub content: Vec<u8>,
    /// MIME content type (e.g. `image/png`).
    pub content_type: String,
    /// Original file name, if known.
    pub filename: Option<String>,
}

impl Blob {
    /// Creates a blob without a file name.
    #[must_use]
    pub fn new(id: BlobId, content: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            content_type: content_type.into(),
            filename: None,
        }
    }

    /// Sets the file name.
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Returns the content size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if the content is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Storage of binary objects referenced by ID.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns true if a blob with this ID exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collaborator`] if the store cannot be queried.
    async fn exists(&self, id: BlobId) -> Result<bool>;

    /// Loads a blob, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collaborator`] if the store cannot be queried.
    async fn resolve(&self, id: BlobId) -> Result<Option<Blob>>;
}

/// User record from a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Canonical address of the user.
    pub address: String,
    /// Display name of the user.
    pub display_name: Option<String>,
}

/// Directory resolving user IDs to canonical addresses and names.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up a user, or `None` if the ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Collaborator`] if the directory cannot be queried.
    async fn lookup(&self, user_id: UserId) -> Result<Option<DirectoryEntry>>;
}

/// The side-effecting boundary that actually delivers mail.
///
/// Implementations own MIME assembly, wire protocol, timeouts and any retry
/// policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers a message and returns the ID of its delivery record.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TransportFailure`] on network or protocol errors.
    async fn deliver(&self, message: &OutgoingMessage) -> Result<DeliveryId>;
}

/// Source of Message-IDs for messages that do not set one explicitly.
pub trait MessageIdGenerator: Send + Sync {
    /// Generates a new, unique Message-ID.
    fn generate(&self) -> MessageId;
}

/// Generates Message-IDs of the form
/// `<seconds.nanos.sequence.instance.pid@domain>`.
///
/// `instance` identifies the generator, so two generators in one process
/// never hand out the same ID.
#[derive(Debug)]
pub struct TimestampMessageIdGenerator {
    counter: AtomicU64,
    instance: String,
    domain: String,
}

impl TimestampMessageIdGenerator {
    /// Creates a generator for the given domain.
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            instance: instance_stamp(),
            domain: domain.into(),
        }
    }
}

impl MessageIdGenerator for TimestampMessageIdGenerator {
    fn generate(&self) -> MessageId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();
        let left = format!(
            "{}.{:09}.{n}.{}.{}",
            now.timestamp(),
            now.timestamp_subsec_nanos(),
            self.instance,
            std::process::id()
        );

        // Fall back to a fixed domain if the configured one is not usable.
        MessageId::parse(&format!("{left}@{}", self.domain)).unwrap_or_else(|_| {
            tracing::warn!(domain = %self.domain, "unusable message id domain, using localhost");
            MessageId::new_unchecked(&format!("{left}@localhost"))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::needless_collect)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_blob_builder() {
        let blob = Blob::new(BlobId::new(1), b"PNG".to_vec(), "image/png").with_filename("logo.png");
        assert_eq!(blob.len(), 3);
        assert!(!blob.is_empty());
        assert_eq!(blob.filename.as_deref(), Some("logo.png"));
    }

    #[test]
    fn test_generated_message_ids_are_unique() {
        let generator = TimestampMessageIdGenerator::new("example.com");
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let id = generator.generate();
            assert!(id.as_str().ends_with("@example.com>"));
            assert!(seen.insert(id), "duplicate message id generated");
        }
    }

    #[test]
    fn test_generator_falls_back_on_bad_domain() {
        let generator = TimestampMessageIdGenerator::new("bad domain");
        assert!(generator.generate().as_str().ends_with("@localhost>"));
    }

    #[test]
    fn test_separate_generators_never_collide() {
        let first = TimestampMessageIdGenerator::new("example.com");
        let second = TimestampMessageIdGenerator::new("example.com");
        for _ in 0..100 {
            assert_ne!(first.generate(), second.generate());
        }
    }
}
