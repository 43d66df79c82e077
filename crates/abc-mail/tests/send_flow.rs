//! Integration tests for composing and sending messages.
//!
//! These tests drive messages through a factory with in-memory and custom
//! collaborators, without a real blob store or mail server.

#![allow(clippy::unwrap_used, clippy::redundant_clone, clippy::similar_names)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use abc_mail::memory::{MemoryBlobStore, MemoryTransport, MemoryUserDirectory};
use abc_mail::{
    AddressRole, Blob, BlobId, BlobStore, DefaultMailMessageFactory, DeliveryId, Error,
    MailConfig, MailMessageFactory, MessageState, OutgoingMessage, Result, Transport, UserId,
};
use async_trait::async_trait;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("abc_mail=debug"))
        .with_test_writer()
        .try_init();
}

/// Transport that never finishes on its own.
struct StalledTransport {
    attempts: AtomicUsize,
}

#[async_trait]
impl Transport for StalledTransport {
    async fn deliver(&self, _message: &OutgoingMessage) -> Result<DeliveryId> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(DeliveryId::new(1))
    }
}

/// Blob store that is always unreachable.
struct OfflineBlobStore;

#[async_trait]
impl BlobStore for OfflineBlobStore {
    async fn exists(&self, _id: BlobId) -> Result<bool> {
        Err(Error::Collaborator("blob store offline".into()))
    }

    async fn resolve(&self, _id: BlobId) -> Result<Option<Blob>> {
        Err(Error::Collaborator("blob store offline".into()))
    }
}

#[tokio::test]
async fn test_newsletter_with_inline_image_and_attachment() {
    init_tracing();

    let store = Arc::new(MemoryBlobStore::new());
    let transport = Arc::new(MemoryTransport::new());
    let directory = Arc::new(MemoryUserDirectory::new());
    directory.insert(UserId::new(100), "reader@example.org", Some("Regular Reader"));

    let factory = DefaultMailMessageFactory::try_new(
        MailConfig::from_json(r#"{"domain": "news.example.com"}"#).unwrap(),
        store.clone(),
        transport.clone(),
    )
    .unwrap()
    .with_directory(directory);

    let logo = store.insert(b"\x89PNG".to_vec(), "image/png");
    let brochure = BlobId::new(500);
    store.insert_blob(
        Blob::new(brochure, b"%PDF-1.7".to_vec(), "application/pdf").with_filename("spring.pdf"),
    );

    let mut message = factory.create_mail_message();
    let cid = message.embed(logo).unwrap();
    let html = format!(r#"<html><body><img src="{}"></body></html>"#, cid.url());
    let body = store.insert(html.into_bytes(), "text/html; charset=utf-8");

    message
        .add_to(Some(UserId::new(100)), "reader@example.org", None)
        .unwrap()
        .add_bcc(None, "archive@news.example.com", None)
        .unwrap()
        .add_from(None, "editor@news.example.com", Some("The Editor"))
        .unwrap()
        .set_sender(None, "bounces@news.example.com", None)
        .unwrap()
        .add_reply_to(None, "letters@news.example.com", None)
        .unwrap()
        .add_read_receipt_to(None, "editor@news.example.com", None)
        .unwrap()
        .add_custom_header(Some("List-Unsubscribe"), Some("<mailto:unsub@news.example.com>"))
        .unwrap()
        .add_custom_header(Some("X-Campaign"), None)
        .unwrap()
        .set_subject("Spring issue")
        .unwrap()
        .set_body(body)
        .unwrap()
        .attach(brochure)
        .unwrap();

    let delivery_id = message.send().await.unwrap();
    assert!(matches!(message.state(), MessageState::Sent { .. }));

    let delivered = transport.get(delivery_id).unwrap();
    assert_eq!(delivered.envelope_from, "bounces@news.example.com");
    assert_eq!(
        delivered.envelope_to,
        ["reader@example.org", "archive@news.example.com"]
    );
    assert_eq!(
        delivered.header("To").as_deref(),
        Some("Regular Reader <reader@example.org>")
    );
    assert_eq!(
        delivered.header("From").as_deref(),
        Some("The Editor <editor@news.example.com>")
    );
    assert_eq!(
        delivered.header("Disposition-Notification-To").as_deref(),
        Some("<editor@news.example.com>")
    );
    assert!(delivered.header("Bcc").is_none());
    assert!(delivered.header("X-Campaign").is_none());
    assert_eq!(delivered.custom_headers.len(), 1);
    assert!(
        delivered
            .message_id
            .as_str()
            .ends_with("@news.example.com>")
    );

    assert_eq!(delivered.embedded.len(), 1);
    assert_eq!(delivered.embedded[0].content_id, cid);
    assert!(
        String::from_utf8(delivered.body.clone().unwrap().content)
            .unwrap()
            .contains(&cid.url())
    );
    assert_eq!(delivered.attachments.len(), 1);
    assert_eq!(delivered.attachments[0].filename.as_deref(), Some("spring.pdf"));
    assert_eq!(delivered.addresses_for(AddressRole::Sender).count(), 1);
}

#[tokio::test]
async fn test_fix_and_retry_after_incomplete_message() {
    init_tracing();

    let transport = Arc::new(MemoryTransport::new());
    let factory = DefaultMailMessageFactory::new(
        MailConfig::new("example.com"),
        Arc::new(MemoryBlobStore::new()),
        transport.clone(),
    );

    let mut message = factory.create_mail_message();
    message.add_from(None, "f@example.com", None).unwrap();

    assert!(matches!(
        message.send().await,
        Err(Error::IncompleteMessage(_))
    ));
    assert_eq!(message.state(), MessageState::Building);

    message.add_cc(None, "c@example.com", None).unwrap();
    let delivery_id = message.send().await.unwrap();
    assert_eq!(message.delivery_id(), Some(delivery_id));
    assert_eq!(transport.delivery_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_send_leaves_message_building() {
    init_tracing();

    let transport = Arc::new(StalledTransport {
        attempts: AtomicUsize::new(0),
    });
    let factory = DefaultMailMessageFactory::new(
        MailConfig::new("example.com"),
        Arc::new(MemoryBlobStore::new()),
        transport.clone(),
    );

    let mut message = factory.create_mail_message();
    message
        .add_to(None, "a@example.com", None)
        .unwrap()
        .add_from(None, "f@example.com", None)
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(30), message.send()).await;
    assert!(result.is_err(), "send should have timed out");
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(message.state(), MessageState::Building);

    message.set_subject("still editable").unwrap();
}

#[tokio::test]
async fn test_blob_store_failure_propagates() {
    let transport = Arc::new(MemoryTransport::new());
    let factory = DefaultMailMessageFactory::new(
        MailConfig::default(),
        Arc::new(OfflineBlobStore),
        transport.clone(),
    );

    let mut message = factory.create_mail_message();
    message
        .add_to(None, "a@example.com", None)
        .unwrap()
        .add_from(None, "f@example.com", None)
        .unwrap()
        .set_body(BlobId::new(1))
        .unwrap();

    let err = message.send().await.unwrap_err();
    assert_eq!(err, Error::Collaborator("blob store offline".into()));
    assert!(!err.is_validation());
    assert_eq!(transport.delivery_count(), 0);
    assert_eq!(message.state(), MessageState::Building);
}

#[test]
fn test_factory_shared_between_threads() {
    let transport = Arc::new(MemoryTransport::new());
    let factory = Arc::new(DefaultMailMessageFactory::new(
        MailConfig::new("example.com"),
        Arc::new(MemoryBlobStore::new()),
        transport.clone(),
    ));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let factory = Arc::clone(&factory);
            std::thread::spawn(move || {
                let mut message = factory.create_mail_message();
                message
                    .add_to(None, &format!("user{i}@example.com"), None)
                    .unwrap()
                    .add_from(None, "f@example.com", None)
                    .unwrap();
                tokio_test::block_on(message.send()).unwrap()
            })
        })
        .collect();

    let mut ids: Vec<DeliveryId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(transport.delivery_count(), 4);
}
