//! In-memory collaborators.
//!
//! Useful for tests, demos and sandbox setups where no real storage or mail
//! server is available. All types are cheap to share behind an `Arc`.

use crate::collaborator::{Blob, BlobStore, DirectoryEntry, Transport, UserDirectory};
use crate::error::{Error, Result};
use crate::outgoing::OutgoingMessage;
use crate::types::{BlobId, DeliveryId, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

/// Blob store backed by a hash map.
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<BlobId, Blob>>,
    next_id: AtomicU64,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    /// Creates an empty store. Allocated IDs start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores content under a freshly allocated ID.
    pub fn insert(&self, content: impl Into<Vec<u8>>, content_type: impl Into<String>) -> BlobId {
        let id = BlobId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.insert_blob(Blob::new(id, content, content_type));
        id
    }

    /// Stores a blob under its own ID, replacing any previous blob with that ID.
    pub fn insert_blob(&self, blob: Blob) {
        self.next_id
            .fetch_max(blob.id.get().saturating_add(1), Ordering::Relaxed);
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob.id, blob);
    }

    /// Removes a blob.
    pub fn remove(&self, id: BlobId) -> Option<Blob> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Returns the number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn exists(&self, id: BlobId) -> Result<bool> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id))
    }

    async fn resolve(&self, id: BlobId) -> Result<Option<Blob>> {
        Ok(self
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned())
    }
}

/// User directory backed by a hash map.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<UserId, DirectoryEntry>>,
}

impl MemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user_id: UserId, address: impl Into<String>, display_name: Option<&str>) {
        let entry = DirectoryEntry {
            address: address.into(),
            display_name: display_name.map(str::to_string),
        };
        self.users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, entry);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn lookup(&self, user_id: UserId) -> Result<Option<DirectoryEntry>> {
        Ok(self
            .users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned())
    }
}

#[derive(Debug)]
struct TransportState {
    delivered: Vec<(DeliveryId, OutgoingMessage)>,
    next_id: u64,
    failures: VecDeque<Error>,
}

/// Transport that records messages instead of sending them.
///
/// Delivery IDs are assigned sequentially starting at 1. Failures can be
/// queued with [`MemoryTransport::fail_next`] to exercise error paths.
#[derive(Debug)]
pub struct MemoryTransport {
    state: Mutex<TransportState>,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    /// Creates a transport with no recorded deliveries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TransportState {
                delivered: Vec::new(),
                next_id: 1,
                failures: VecDeque::new(),
            }),
        }
    }

    /// Makes the next delivery fail with `error`.
    ///
    /// Queued failures are consumed in order, one per delivery attempt.
    pub fn fail_next(&self, error: Error) {
        self.lock().failures.push_back(error);
    }

    /// Returns all delivered messages in delivery order.
    #[must_use]
    pub fn delivered(&self) -> Vec<OutgoingMessage> {
        self.lock()
            .delivered
            .iter()
            .map(|(_, message)| message.clone())
            .collect()
    }

    /// Returns the message recorded under a delivery ID.
    #[must_use]
    pub fn get(&self, id: DeliveryId) -> Option<OutgoingMessage> {
        self.lock()
            .delivered
            .iter()
            .find(|(delivery_id, _)| *delivery_id == id)
            .map(|(_, message)| message.clone())
    }

    /// Returns the most recently delivered message.
    #[must_use]
    pub fn last(&self) -> Option<OutgoingMessage> {
        self.lock()
            .delivered
            .last()
            .map(|(_, message)| message.clone())
    }

    /// Returns the number of delivered messages.
    #[must_use]
    pub fn delivery_count(&self) -> usize {
        self.lock().delivered.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn deliver(&self, message: &OutgoingMessage) -> Result<DeliveryId> {
        let mut state = self.lock();

        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let id = DeliveryId::new(state.next_id);
        state.next_id += 1;
        state.delivered.push((id, message.clone()));

        tracing::debug!(delivery_id = %id, message_id = %message.message_id, "recorded delivery");
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use crate::types::{Address, AddressRole, MessageId};

    fn outgoing(id: &str) -> OutgoingMessage {
        OutgoingMessage {
            message_id: MessageId::parse(id).unwrap(),
            addresses: vec![(
                AddressRole::To,
                Address::new(None, "a@example.com", None).unwrap(),
            )],
            subject: String::new(),
            custom_headers: Vec::new(),
            envelope_from: "s@example.com".to_string(),
            envelope_to: vec!["a@example.com".to_string()],
            body: None,
            attachments: Vec::new(),
            embedded: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_blob_store_insert_resolve() {
        let store = MemoryBlobStore::new();
        let id = store.insert(b"hello".to_vec(), "text/plain");
        assert_eq!(id, BlobId::new(1));
        assert!(store.exists(id).await.unwrap());

        let blob = store.resolve(id).await.unwrap().unwrap();
        assert_eq!(blob.content, b"hello");
        assert_eq!(blob.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_blob_store_explicit_ids() {
        let store = MemoryBlobStore::new();
        store.insert_blob(Blob::new(BlobId::new(42), b"x".to_vec(), "text/plain"));
        assert_eq!(store.insert(b"y".to_vec(), "text/plain"), BlobId::new(43));
        assert_eq!(store.len(), 2);

        assert!(store.remove(BlobId::new(42)).is_some());
        assert!(!store.exists(BlobId::new(42)).await.unwrap());
        assert!(store.resolve(BlobId::new(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_lookup() {
        let directory = MemoryUserDirectory::new();
        directory.insert(UserId::new(5), "five@example.com", Some("Five"));

        let entry = directory.lookup(UserId::new(5)).await.unwrap().unwrap();
        assert_eq!(entry.address, "five@example.com");
        assert_eq!(entry.display_name.as_deref(), Some("Five"));
        assert!(directory.lookup(UserId::new(6)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_assigns_sequential_ids() {
        let transport = MemoryTransport::new();
        let first = transport.deliver(&outgoing("1@example.com")).await.unwrap();
        let second = transport.deliver(&outgoing("2@example.com")).await.unwrap();

        assert_eq!(first, DeliveryId::new(1));
        assert_eq!(second, DeliveryId::new(2));
        assert_eq!(transport.delivery_count(), 2);
        assert_eq!(
            transport.get(first).unwrap().message_id.as_str(),
            "<1@example.com>"
        );
        assert_eq!(
            transport.last().unwrap().message_id.as_str(),
            "<2@example.com>"
        );
    }

    #[tokio::test]
    async fn test_transport_queued_failures() {
        let transport = MemoryTransport::new();
        transport.fail_next(Error::transport("connection refused"));

        let result = transport.deliver(&outgoing("1@example.com")).await;
        assert_eq!(result, Err(Error::transport("connection refused")));
        assert_eq!(transport.delivery_count(), 0);

        assert!(transport.deliver(&outgoing("1@example.com")).await.is_ok());
        assert_eq!(transport.delivered().len(), 1);
    }
}
