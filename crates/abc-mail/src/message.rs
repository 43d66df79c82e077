//! The mail message builder.
//!
//! A [`MailMessage`] accumulates addressing, headers, attachments, embedded
//! objects and a body, then hands the assembled message to a
//! [`Transport`](crate::Transport). It is single-use:
//!
//! ```text
//! ┌──────────┐   send() ok   ┌──────┐
//! │ Building │ ────────────→ │ Sent │
//! └──────────┘               └──────┘
//!      ↑ │ send() err
//!      └─┘
//! ```
//!
//! Every mutator and `send` fail with [`Error::AlreadySent`] once the message
//! is sent. A call that fails leaves the message unchanged.
//!
//! Blob existence is checked when the message is sent, before anything is
//! handed to the transport. Use [`MailMessage::verify_blobs`] to check earlier.

use crate::collaborator::{Blob, BlobStore, MessageIdGenerator, Transport, UserDirectory};
use crate::config::MailConfig;
use crate::error::{Error, Result};
use crate::outgoing::{EmbeddedBlob, OutgoingMessage};
use crate::types::{
    Address, AddressRole, BlobId, ContentId, ContentIdGenerator, CustomHeader, DeliveryId,
    MessageId, UserId, has_control,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Collaborators and settings shared by all messages of one factory.
pub(crate) struct MessageContext {
    pub(crate) blob_store: Arc<dyn BlobStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) directory: Option<Arc<dyn UserDirectory>>,
    pub(crate) message_ids: Arc<dyn MessageIdGenerator>,
    pub(crate) content_ids: ContentIdGenerator,
    pub(crate) config: MailConfig,
}

/// Lifecycle state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// Accepting changes.
    Building,
    /// Delivered; no further operation is accepted.
    Sent {
        /// ID the transport assigned to the delivery.
        delivery_id: DeliveryId,
    },
}

/// Builder for a single outbound email.
///
/// Created by a [`MailMessageFactory`](crate::MailMessageFactory). Mutators
/// return `Result<&mut Self>` so they chain with `?`:
///
/// ```ignore
/// message
///     .add_to(None, "a@example.com", Some("A"))?
///     .set_sender(None, "s@example.com", Some("S"))?
///     .set_subject("Hi")?
///     .set_body(BlobId::new(42))?;
/// let delivery_id = message.send().await?;
/// ```
pub struct MailMessage {
    context: Arc<MessageContext>,
    state: MessageState,
    addresses: Vec<(AddressRole, Address)>,
    sender: Option<Address>,
    custom_headers: Vec<CustomHeader>,
    attachments: Vec<BlobId>,
    embedded: Vec<(BlobId, ContentId)>,
    body: Option<BlobId>,
    message_id: Option<MessageId>,
    subject: String,
}

impl MailMessage {
    pub(crate) fn new(context: Arc<MessageContext>) -> Self {
        Self {
            context,
            state: MessageState::Building,
            addresses: Vec::new(),
            sender: None,
            custom_headers: Vec::new(),
            attachments: Vec::new(),
            embedded: Vec::new(),
            body: None,
            message_id: None,
            subject: String::new(),
        }
    }

    /// Adds a To addressee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address or name is malformed,
    /// or [`Error::AlreadySent`].
    pub fn add_to(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::To, user_id, address, name)
    }

    /// Adds a Cc addressee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn add_cc(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::Cc, user_id, address, name)
    }

    /// Adds a Bcc addressee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn add_bcc(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::Bcc, user_id, address, name)
    }

    /// Adds a From addressee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn add_from(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::From, user_id, address, name)
    }

    /// Adds a Reply-To addressee.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn add_reply_to(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::ReplyTo, user_id, address, name)
    }

    /// Adds a `Disposition-Notification-To` addressee (read receipt).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn add_read_receipt_to(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.add_address(AddressRole::ReadReceiptTo, user_id, address, name)
    }

    /// Sets the Sender, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] or [`Error::AlreadySent`].
    pub fn set_sender(
        &mut self,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.ensure_building()?;
        let address = Address::new(user_id, address, name)?;
        debug!(sender = %address.address, "set sender");
        self.sender = Some(address);
        Ok(self)
    }

    /// Adds a custom header.
    ///
    /// If either `name` or `value` is `None` no header is added and the call
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] for a malformed name or a value with a
    /// control character, [`Error::ReservedHeader`] for headers the message manages
    /// itself, or [`Error::AlreadySent`].
    pub fn add_custom_header(
        &mut self,
        name: Option<&str>,
        value: Option<&str>,
    ) -> Result<&mut Self> {
        self.ensure_building()?;
        let (Some(name), Some(value)) = (name, value) else {
            return Ok(self);
        };

        let header = CustomHeader::new(name, value)?;
        debug!(header = %header.name, "added custom header");
        self.custom_headers.push(header);
        Ok(self)
    }

    /// Attaches a blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySent`].
    pub fn attach(&mut self, blob_id: BlobId) -> Result<&mut Self> {
        self.ensure_building()?;
        debug!(%blob_id, "attached blob");
        self.attachments.push(blob_id);
        Ok(self)
    }

    /// Embeds a blob and returns the Content-ID to reference it by.
    ///
    /// Every call yields a new Content-ID, also for a blob that is already
    /// embedded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySent`].
    pub fn embed(&mut self, blob_id: BlobId) -> Result<ContentId> {
        self.ensure_building()?;
        let cid = self.context.content_ids.next();
        debug!(%blob_id, %cid, "embedded blob");
        self.embedded.push((blob_id, cid.clone()));
        Ok(cid)
    }

    /// Sets the body blob, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySent`].
    pub fn set_body(&mut self, blob_id: BlobId) -> Result<&mut Self> {
        self.ensure_building()?;
        debug!(%blob_id, "set body");
        self.body = Some(blob_id);
        Ok(self)
    }

    /// Sets an explicit Message-ID, with or without angle brackets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMessageId`] or [`Error::AlreadySent`].
    pub fn set_message_id(&mut self, id: &str) -> Result<&mut Self> {
        self.ensure_building()?;
        let id = MessageId::parse(id)?;
        debug!(message_id = %id, "set message id");
        self.message_id = Some(id);
        Ok(self)
    }

    /// Sets the subject. An empty subject is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] if the subject contains a control
    /// character other than tab, or [`Error::AlreadySent`].
    pub fn set_subject(&mut self, subject: &str) -> Result<&mut Self> {
        self.ensure_building()?;
        if has_control(subject) {
            return Err(Error::InvalidHeader(
                "Subject contains a control character".into(),
            ));
        }
        self.subject = subject.to_string();
        Ok(self)
    }

    /// Checks that every referenced blob exists in the blob store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownBlob`] for the first missing blob, or
    /// [`Error::Collaborator`] if the store fails.
    pub async fn verify_blobs(&self) -> Result<()> {
        for id in self.blob_ids() {
            if !self.context.blob_store.exists(id).await? {
                return Err(Error::UnknownBlob(id));
            }
        }
        Ok(())
    }

    /// Sends the message and returns the ID of its delivery record.
    ///
    /// On success the message moves to [`MessageState::Sent`]. On any error
    /// it stays in [`MessageState::Building`] untouched, so the caller may fix
    /// the problem and call `send` again. No retries are made here.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadySent`] if the message was sent before.
    /// - [`Error::IncompleteMessage`] without a To/Cc/Bcc recipient or
    ///   without a Sender or From address.
    /// - [`Error::UnknownBlob`] if a referenced blob does not exist.
    /// - Any error of the transport, unchanged.
    pub async fn send(&mut self) -> Result<DeliveryId> {
        self.ensure_building()?;
        self.ensure_complete()?;

        let outgoing = self.assemble().await?;
        let recipients = outgoing.recipient_count();

        match self.context.transport.deliver(&outgoing).await {
            Ok(delivery_id) => {
                info!(
                    %delivery_id,
                    message_id = %outgoing.message_id,
                    recipients,
                    "message sent"
                );
                self.state = MessageState::Sent { delivery_id };
                Ok(delivery_id)
            }
            Err(e) => {
                warn!(message_id = %outgoing.message_id, error = %e, "delivery failed");
                Err(e)
            }
        }
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub const fn state(&self) -> MessageState {
        self.state
    }

    /// Returns true once the message has been sent.
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        matches!(self.state, MessageState::Sent { .. })
    }

    /// Returns the delivery ID once the message has been sent.
    #[must_use]
    pub const fn delivery_id(&self) -> Option<DeliveryId> {
        match self.state {
            MessageState::Sent { delivery_id } => Some(delivery_id),
            MessageState::Building => None,
        }
    }

    /// Returns all addresses except the Sender, in insertion order.
    #[must_use]
    pub fn addresses(&self) -> &[(AddressRole, Address)] {
        &self.addresses
    }

    /// Returns the addresses with the given role, in insertion order.
    ///
    /// For [`AddressRole::Sender`] this yields at most one address.
    pub fn addresses_for(&self, role: AddressRole) -> impl Iterator<Item = &Address> {
        let sender = if role == AddressRole::Sender {
            self.sender.as_ref()
        } else {
            None
        };

        sender.into_iter().chain(
            self.addresses
                .iter()
                .filter(move |(r, _)| *r == role)
                .map(|(_, address)| address),
        )
    }

    /// Returns the Sender.
    #[must_use]
    pub const fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    /// Returns the custom headers in insertion order.
    #[must_use]
    pub fn custom_headers(&self) -> &[CustomHeader] {
        &self.custom_headers
    }

    /// Returns the attached blobs in insertion order.
    #[must_use]
    pub fn attachments(&self) -> &[BlobId] {
        &self.attachments
    }

    /// Returns the embedded blobs and their Content-IDs in insertion order.
    #[must_use]
    pub fn embedded(&self) -> &[(BlobId, ContentId)] {
        &self.embedded
    }

    /// Returns the body blob.
    #[must_use]
    pub const fn body(&self) -> Option<BlobId> {
        self.body
    }

    /// Returns the explicit Message-ID, if set.
    #[must_use]
    pub const fn message_id(&self) -> Option<&MessageId> {
        self.message_id.as_ref()
    }

    /// Returns the subject.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns the number of To, Cc and Bcc addressees.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.addresses
            .iter()
            .filter(|(role, _)| role.is_recipient())
            .count()
    }

    fn add_address(
        &mut self,
        role: AddressRole,
        user_id: Option<UserId>,
        address: &str,
        name: Option<&str>,
    ) -> Result<&mut Self> {
        self.ensure_building()?;
        let address = Address::new(user_id, address, name)?;
        debug!(%role, address = %address.address, "added address");
        self.addresses.push((role, address));
        Ok(self)
    }

    const fn ensure_building(&self) -> Result<()> {
        match self.state {
            MessageState::Building => Ok(()),
            MessageState::Sent { .. } => Err(Error::AlreadySent),
        }
    }

    fn ensure_complete(&self) -> Result<()> {
        if self.recipient_count() == 0 {
            return Err(Error::IncompleteMessage(
                "at least one To, Cc or Bcc recipient is required".into(),
            ));
        }

        if self.sender.is_none() && self.addresses_for(AddressRole::From).next().is_none() {
            return Err(Error::IncompleteMessage(
                "a Sender or From address is required".into(),
            ));
        }

        Ok(())
    }

    fn blob_ids(&self) -> impl Iterator<Item = BlobId> + '_ {
        self.body
            .into_iter()
            .chain(self.attachments.iter().copied())
            .chain(self.embedded.iter().map(|(id, _)| *id))
    }

    async fn resolve_blob(&self, id: BlobId) -> Result<Blob> {
        self.context
            .blob_store
            .resolve(id)
            .await?
            .ok_or(Error::UnknownBlob(id))
    }

    /// Builds the outgoing message without touching `self`.
    async fn assemble(&self) -> Result<OutgoingMessage> {
        let body = match self.body {
            Some(id) => Some(self.resolve_blob(id).await?),
            None => None,
        };

        let mut attachments = Vec::with_capacity(self.attachments.len());
        for id in &self.attachments {
            attachments.push(self.resolve_blob(*id).await?);
        }

        let mut embedded = Vec::with_capacity(self.embedded.len());
        for (id, content_id) in &self.embedded {
            embedded.push(EmbeddedBlob {
                content_id: content_id.clone(),
                blob: self.resolve_blob(*id).await?,
            });
        }

        let mut addresses = self.addresses.clone();
        if let Some(sender) = &self.sender {
            addresses.push((AddressRole::Sender, sender.clone()));
        }
        self.resolve_display_names(&mut addresses).await?;

        let message_id = self
            .message_id
            .clone()
            .unwrap_or_else(|| self.context.message_ids.generate());

        let envelope_from = self
            .sender
            .as_ref()
            .or_else(|| self.addresses_for(AddressRole::From).next())
            .map(|address| address.address.clone())
            .unwrap_or_default();

        let envelope_to = match &self.context.config.sandbox_recipient {
            Some(sandbox) => {
                warn!(%sandbox, %message_id, "sandbox mode, redirecting all recipients");
                vec![sandbox.clone()]
            }
            None => self.envelope_recipients(),
        };

        Ok(OutgoingMessage {
            message_id,
            addresses,
            subject: self.subject.clone(),
            custom_headers: self.custom_headers.clone(),
            envelope_from,
            envelope_to,
            body,
            attachments,
            embedded,
        })
    }

    /// To, Cc and Bcc addresses in that order, without duplicates.
    fn envelope_recipients(&self) -> Vec<String> {
        let mut recipients: Vec<String> = Vec::new();
        for role in [AddressRole::To, AddressRole::Cc, AddressRole::Bcc] {
            for address in self.addresses_for(role) {
                if !recipients
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(&address.address))
                {
                    recipients.push(address.address.clone());
                }
            }
        }
        recipients
    }

    /// Fills in missing display names of directory users.
    async fn resolve_display_names(&self, addresses: &mut [(AddressRole, Address)]) -> Result<()> {
        let Some(directory) = &self.context.directory else {
            return Ok(());
        };
        if !self.context.config.resolve_display_names {
            return Ok(());
        }

        let mut names: HashMap<UserId, Option<String>> = HashMap::new();
        for (_, address) in addresses.iter_mut() {
            let Some(user_id) = address.user_id else {
                continue;
            };
            if address.display_name.is_some() {
                continue;
            }

            if !names.contains_key(&user_id) {
                let name = directory
                    .lookup(user_id)
                    .await?
                    .and_then(|entry| entry.display_name)
                    .filter(|name| !has_control(name));
                names.insert(user_id, name);
            }

            if let Some(Some(name)) = names.get(&user_id) {
                debug!(%user_id, %name, "resolved display name from directory");
                address.display_name = Some(name.clone());
            }
        }

        Ok(())
    }
}

impl fmt::Debug for MailMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailMessage")
            .field("state", &self.state)
            .field("addresses", &self.addresses)
            .field("sender", &self.sender)
            .field("custom_headers", &self.custom_headers)
            .field("attachments", &self.attachments)
            .field("embedded", &self.embedded)
            .field("body", &self.body)
            .field("message_id", &self.message_id)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::factory::{DefaultMailMessageFactory, MailMessageFactory};
    use crate::memory::{MemoryBlobStore, MemoryTransport, MemoryUserDirectory};
    use proptest::prelude::*;

    struct Fixture {
        store: Arc<MemoryBlobStore>,
        transport: Arc<MemoryTransport>,
        factory: DefaultMailMessageFactory,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryBlobStore::new());
        let transport = Arc::new(MemoryTransport::new());
        let factory = DefaultMailMessageFactory::new(
            MailConfig::new("example.com"),
            store.clone(),
            transport.clone(),
        );
        Fixture {
            store,
            transport,
            factory,
        }
    }

    fn ready(message: &mut MailMessage) {
        message
            .add_to(None, "a@example.com", Some("A"))
            .unwrap()
            .set_sender(None, "s@example.com", Some("S"))
            .unwrap();
    }

    #[test]
    fn test_new_message_is_empty() {
        let message = fixture().factory.create_mail_message();
        assert_eq!(message.state(), MessageState::Building);
        assert!(message.addresses().is_empty());
        assert!(message.sender().is_none());
        assert!(message.custom_headers().is_empty());
        assert!(message.attachments().is_empty());
        assert!(message.embedded().is_empty());
        assert!(message.body().is_none());
        assert!(message.message_id().is_none());
        assert_eq!(message.subject(), "");
    }

    #[test]
    fn test_chaining() {
        let mut message = fixture().factory.create_mail_message();
        message
            .add_to(None, "a@example.com", None)
            .unwrap()
            .add_cc(None, "c@example.com", None)
            .unwrap()
            .add_bcc(None, "b@example.com", None)
            .unwrap()
            .add_from(None, "f@example.com", None)
            .unwrap()
            .add_reply_to(None, "r@example.com", None)
            .unwrap()
            .add_read_receipt_to(None, "rr@example.com", None)
            .unwrap();

        let roles: Vec<AddressRole> = message.addresses().iter().map(|(r, _)| *r).collect();
        assert_eq!(
            roles,
            [
                AddressRole::To,
                AddressRole::Cc,
                AddressRole::Bcc,
                AddressRole::From,
                AddressRole::ReplyTo,
                AddressRole::ReadReceiptTo
            ]
        );
        assert_eq!(message.recipient_count(), 3);
    }

    #[test]
    fn test_invalid_address_has_no_effect() {
        let mut message = fixture().factory.create_mail_message();
        assert!(matches!(
            message.add_to(None, "not-an-address", None),
            Err(Error::InvalidAddress(_))
        ));
        assert!(message.addresses().is_empty());
    }

    #[test]
    fn test_set_sender_overwrites() {
        let mut message = fixture().factory.create_mail_message();
        message
            .set_sender(None, "first@example.com", Some("First"))
            .unwrap()
            .set_sender(Some(UserId::new(2)), "second@example.com", None)
            .unwrap();

        let sender = message.sender().unwrap();
        assert_eq!(sender.address, "second@example.com");
        assert_eq!(sender.user_id, Some(UserId::new(2)));
        assert!(sender.display_name.is_none());
        assert_eq!(message.addresses_for(AddressRole::Sender).count(), 1);
    }

    #[test]
    fn test_from_is_multi_valued() {
        let mut message = fixture().factory.create_mail_message();
        message
            .add_from(None, "one@example.com", None)
            .unwrap()
            .add_from(None, "two@example.com", None)
            .unwrap();

        let from: Vec<&str> = message
            .addresses_for(AddressRole::From)
            .map(Address::as_str)
            .collect();
        assert_eq!(from, ["one@example.com", "two@example.com"]);
    }

    #[test]
    fn test_custom_header_none_is_noop() {
        let mut message = fixture().factory.create_mail_message();
        message
            .add_custom_header(None, Some("value"))
            .unwrap()
            .add_custom_header(Some("X-Name"), None)
            .unwrap()
            .add_custom_header(None, None)
            .unwrap();
        assert!(message.custom_headers().is_empty());

        message
            .add_custom_header(Some("X-Name"), Some("value"))
            .unwrap();
        assert_eq!(message.custom_headers().len(), 1);
    }

    #[test]
    fn test_custom_header_reserved() {
        let mut message = fixture().factory.create_mail_message();
        let result = message.add_custom_header(Some("Message-ID"), Some("<x@example.com>"));
        assert_eq!(result.unwrap_err(), Error::ReservedHeader("Message-ID".into()));
        assert!(message.custom_headers().is_empty());
    }

    #[test]
    fn test_custom_headers_keep_order_and_duplicates() {
        let mut message = fixture().factory.create_mail_message();
        message
            .add_custom_header(Some("X-Tag"), Some("one"))
            .unwrap()
            .add_custom_header(Some("X-Other"), Some("two"))
            .unwrap()
            .add_custom_header(Some("X-Tag"), Some("three"))
            .unwrap();

        let values: Vec<&str> = message
            .custom_headers()
            .iter()
            .map(|h| h.value.as_str())
            .collect();
        assert_eq!(values, ["one", "two", "three"]);
    }

    #[test]
    fn test_embed_same_blob_twice_yields_distinct_cids() {
        let mut message = fixture().factory.create_mail_message();
        let first = message.embed(BlobId::new(3)).unwrap();
        let second = message.embed(BlobId::new(3)).unwrap();

        assert_ne!(first, second);
        assert_eq!(message.embedded().len(), 2);
        assert_eq!(message.embedded()[0], (BlobId::new(3), first));
        assert_eq!(message.embedded()[1], (BlobId::new(3), second));
    }

    #[test]
    fn test_cids_unique_across_messages_of_one_factory() {
        let fixture = fixture();
        let mut first = fixture.factory.create_mail_message();
        let mut second = fixture.factory.create_mail_message();
        assert_ne!(
            first.embed(BlobId::new(1)).unwrap(),
            second.embed(BlobId::new(1)).unwrap()
        );
    }

    #[test]
    fn test_attach_keeps_duplicates() {
        let mut message = fixture().factory.create_mail_message();
        message
            .attach(BlobId::new(1))
            .unwrap()
            .attach(BlobId::new(2))
            .unwrap()
            .attach(BlobId::new(1))
            .unwrap();
        assert_eq!(
            message.attachments(),
            [BlobId::new(1), BlobId::new(2), BlobId::new(1)]
        );
    }

    #[test]
    fn test_body_and_subject_overwrite() {
        let mut message = fixture().factory.create_mail_message();
        message
            .set_body(BlobId::new(1))
            .unwrap()
            .set_body(BlobId::new(2))
            .unwrap()
            .set_subject("first")
            .unwrap()
            .set_subject("")
            .unwrap();
        assert_eq!(message.body(), Some(BlobId::new(2)));
        assert_eq!(message.subject(), "");
    }

    #[test]
    fn test_subject_control_characters_rejected() {
        let mut message = fixture().factory.create_mail_message();
        message.set_subject("kept").unwrap();
        for subject in ["Hi\r\nBcc: x@evil.test", "nul\0", "bell\x07"] {
            assert!(
                matches!(message.set_subject(subject), Err(Error::InvalidHeader(_))),
                "{subject:?} accepted"
            );
        }
        assert_eq!(message.subject(), "kept");

        message.set_subject("tab\tseparated").unwrap();
        assert_eq!(message.subject(), "tab\tseparated");
    }

    #[test]
    fn test_message_id_with_specials_rejected() {
        let mut message = fixture().factory.create_mail_message();
        assert!(matches!(
            message.set_message_id("a(b)@example.com"),
            Err(Error::InvalidMessageId(_))
        ));
        assert!(message.message_id().is_none());
    }

    #[test]
    fn test_set_message_id() {
        let mut message = fixture().factory.create_mail_message();
        message.set_message_id("abc@example.com").unwrap();
        assert_eq!(message.message_id().unwrap().as_str(), "<abc@example.com>");

        assert!(matches!(
            message.set_message_id(""),
            Err(Error::InvalidMessageId(_))
        ));
        assert_eq!(message.message_id().unwrap().as_str(), "<abc@example.com>");
    }

    #[tokio::test]
    async fn test_send_without_recipients() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        message.set_sender(None, "s@example.com", None).unwrap();

        let result = message.send().await;
        assert!(matches!(result, Err(Error::IncompleteMessage(_))));
        assert_eq!(message.state(), MessageState::Building);
        assert_eq!(fixture.transport.delivery_count(), 0);
    }

    #[tokio::test]
    async fn test_send_without_sender_or_from() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        message.add_to(None, "a@example.com", None).unwrap();

        assert!(matches!(
            message.send().await,
            Err(Error::IncompleteMessage(_))
        ));

        message.add_from(None, "f@example.com", None).unwrap();
        assert!(message.send().await.is_ok());
        assert_eq!(fixture.transport.last().unwrap().envelope_from, "f@example.com");
    }

    #[tokio::test]
    async fn test_bcc_only_counts_as_recipient() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        message
            .add_bcc(None, "hidden@example.com", None)
            .unwrap()
            .add_from(None, "f@example.com", None)
            .unwrap();
        assert!(message.send().await.is_ok());
    }

    #[tokio::test]
    async fn test_send_example_flow() {
        let fixture = fixture();
        fixture.store.insert_blob(Blob::new(
            BlobId::new(42),
            b"Hello".to_vec(),
            "text/plain; charset=utf-8",
        ));

        let mut message = fixture.factory.create_mail_message();
        message
            .add_to(None, "a@example.com", Some("A"))
            .unwrap()
            .set_sender(None, "s@example.com", Some("S"))
            .unwrap()
            .set_subject("Hi")
            .unwrap()
            .set_body(BlobId::new(42))
            .unwrap();

        let delivery_id = message.send().await.unwrap();
        assert_eq!(delivery_id, DeliveryId::new(1));
        assert!(message.is_sent());
        assert_eq!(message.delivery_id(), Some(delivery_id));

        assert_eq!(message.attach(BlobId::new(1)).unwrap_err(), Error::AlreadySent);
        assert_eq!(message.attachments().len(), 0);

        let delivered = fixture.transport.get(delivery_id).unwrap();
        assert_eq!(delivered.subject, "Hi");
        assert_eq!(delivered.envelope_from, "s@example.com");
        assert_eq!(delivered.envelope_to, ["a@example.com"]);
        assert_eq!(delivered.body.unwrap().content, b"Hello");
    }

    #[tokio::test]
    async fn test_send_twice() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        ready(&mut message);

        assert!(message.send().await.is_ok());
        assert_eq!(message.send().await.unwrap_err(), Error::AlreadySent);
        assert_eq!(fixture.transport.delivery_count(), 1);
    }

    #[tokio::test]
    async fn test_every_mutator_rejected_after_send() {
        let mut message = fixture().factory.create_mail_message();
        ready(&mut message);
        message.send().await.unwrap();

        assert!(matches!(message.add_to(None, "x@example.com", None), Err(Error::AlreadySent)));
        assert!(matches!(message.add_cc(None, "x@example.com", None), Err(Error::AlreadySent)));
        assert!(matches!(message.add_bcc(None, "x@example.com", None), Err(Error::AlreadySent)));
        assert!(matches!(message.add_from(None, "x@example.com", None), Err(Error::AlreadySent)));
        assert!(matches!(
            message.add_reply_to(None, "x@example.com", None),
            Err(Error::AlreadySent)
        ));
        assert!(matches!(
            message.add_read_receipt_to(None, "x@example.com", None),
            Err(Error::AlreadySent)
        ));
        assert!(matches!(message.set_sender(None, "x@example.com", None), Err(Error::AlreadySent)));
        assert!(matches!(
            message.add_custom_header(None, None),
            Err(Error::AlreadySent)
        ));
        assert!(matches!(message.embed(BlobId::new(1)), Err(Error::AlreadySent)));
        assert!(matches!(message.set_body(BlobId::new(1)), Err(Error::AlreadySent)));
        assert!(matches!(message.set_message_id("x@example.com"), Err(Error::AlreadySent)));
        assert!(matches!(message.set_subject("x"), Err(Error::AlreadySent)));
    }

    #[tokio::test]
    async fn test_unknown_blob_detected_at_send() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        ready(&mut message);
        message.attach(BlobId::new(99)).unwrap();

        assert_eq!(
            message.verify_blobs().await.unwrap_err(),
            Error::UnknownBlob(BlobId::new(99))
        );
        assert_eq!(
            message.send().await.unwrap_err(),
            Error::UnknownBlob(BlobId::new(99))
        );
        assert_eq!(message.state(), MessageState::Building);
        assert_eq!(fixture.transport.delivery_count(), 0);

        fixture
            .store
            .insert_blob(Blob::new(BlobId::new(99), b"pdf".to_vec(), "application/pdf"));
        assert!(message.verify_blobs().await.is_ok());
        assert!(message.send().await.is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_leaves_message_building() {
        let fixture = fixture();
        fixture
            .transport
            .fail_next(Error::transport_permanent("550 relay denied"));

        let mut message = fixture.factory.create_mail_message();
        ready(&mut message);
        message.set_message_id("fixed@example.com").unwrap();

        let err = message.send().await.unwrap_err();
        assert_eq!(err, Error::transport_permanent("550 relay denied"));
        assert!(err.is_permanent());
        assert_eq!(message.state(), MessageState::Building);
        assert_eq!(message.addresses().len(), 1);

        let delivery_id = message.send().await.unwrap();
        assert_eq!(
            fixture.transport.get(delivery_id).unwrap().message_id.as_str(),
            "<fixed@example.com>"
        );
    }

    #[tokio::test]
    async fn test_generated_message_id_not_stored() {
        let fixture = fixture();
        fixture.transport.fail_next(Error::transport("timeout"));

        let mut message = fixture.factory.create_mail_message();
        ready(&mut message);
        assert!(message.send().await.is_err());
        assert!(message.message_id().is_none());

        message.send().await.unwrap();
        let delivered = fixture.transport.last().unwrap();
        assert!(delivered.message_id.as_str().ends_with("@example.com>"));
        assert!(message.message_id().is_none());
    }

    #[tokio::test]
    async fn test_envelope_recipients_ordered_and_deduplicated() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        message
            .add_bcc(None, "b@example.com", None)
            .unwrap()
            .add_cc(None, "c@example.com", None)
            .unwrap()
            .add_to(None, "a@example.com", None)
            .unwrap()
            .add_cc(None, "A@example.com", None)
            .unwrap()
            .add_from(None, "f@example.com", None)
            .unwrap();
        message.send().await.unwrap();

        let delivered = fixture.transport.last().unwrap();
        assert_eq!(
            delivered.envelope_to,
            ["a@example.com", "c@example.com", "b@example.com"]
        );
    }

    #[tokio::test]
    async fn test_sender_takes_precedence_for_envelope() {
        let fixture = fixture();
        let mut message = fixture.factory.create_mail_message();
        message
            .add_from(None, "author@example.com", None)
            .unwrap()
            .set_sender(None, "agent@example.com", None)
            .unwrap()
            .add_to(None, "a@example.com", None)
            .unwrap();
        message.send().await.unwrap();

        let delivered = fixture.transport.last().unwrap();
        assert_eq!(delivered.envelope_from, "agent@example.com");
        assert_eq!(
            delivered.header("Sender").as_deref(),
            Some("<agent@example.com>")
        );
    }

    #[tokio::test]
    async fn test_embedded_and_attachments_resolved() {
        let fixture = fixture();
        let logo = fixture.store.insert(b"PNG".to_vec(), "image/png");
        let report = fixture.store.insert(b"PDF".to_vec(), "application/pdf");

        let mut message = fixture.factory.create_mail_message();
        ready(&mut message);
        let cid = message.embed(logo).unwrap();
        message.attach(report).unwrap();
        message.send().await.unwrap();

        let delivered = fixture.transport.last().unwrap();
        assert_eq!(delivered.embedded.len(), 1);
        assert_eq!(delivered.embedded[0].content_id, cid);
        assert_eq!(delivered.embedded[0].blob.content_type, "image/png");
        assert_eq!(delivered.attachments[0].content, b"PDF");
    }

    #[tokio::test]
    async fn test_display_names_from_directory() {
        let store = Arc::new(MemoryBlobStore::new());
        let transport = Arc::new(MemoryTransport::new());
        let directory = Arc::new(MemoryUserDirectory::new());
        directory.insert(UserId::new(7), "alice@example.com", Some("Alice Example"));

        let factory = DefaultMailMessageFactory::new(
            MailConfig::new("example.com"),
            store,
            transport.clone(),
        )
        .with_directory(directory);

        let mut message = factory.create_mail_message();
        message
            .add_to(Some(UserId::new(7)), "alice@example.com", None)
            .unwrap()
            .add_cc(Some(UserId::new(7)), "alice@example.com", Some("Explicit"))
            .unwrap()
            .add_cc(Some(UserId::new(8)), "unknown@example.com", None)
            .unwrap()
            .add_from(None, "f@example.com", None)
            .unwrap();
        message.send().await.unwrap();

        let delivered = transport.last().unwrap();
        let to: Vec<&Address> = delivered.addresses_for(AddressRole::To).collect();
        assert_eq!(to[0].display_name.as_deref(), Some("Alice Example"));

        let cc: Vec<&Address> = delivered.addresses_for(AddressRole::Cc).collect();
        assert_eq!(cc[0].display_name.as_deref(), Some("Explicit"));
        assert!(cc[1].display_name.is_none());

        // The message itself keeps what the caller supplied.
        assert!(message.addresses()[0].1.display_name.is_none());
    }

    proptest! {
        #[test]
        fn prop_addresses_preserve_insertion_order(
            locals in proptest::collection::vec("[a-z][a-z0-9]{0,8}", 1..20),
            roles in proptest::collection::vec(0usize..6, 1..20),
        ) {
            let mut message = fixture().factory.create_mail_message();
            let mut expected: Vec<(AddressRole, String)> = Vec::new();

            for (i, local) in locals.iter().enumerate() {
                let role = match roles[i % roles.len()] {
                    0 => AddressRole::To,
                    1 => AddressRole::Cc,
                    2 => AddressRole::Bcc,
                    3 => AddressRole::From,
                    4 => AddressRole::ReplyTo,
                    _ => AddressRole::ReadReceiptTo,
                };
                let address = format!("{local}@example.com");
                let _ = match role {
                    AddressRole::To => message.add_to(None, &address, None),
                    AddressRole::Cc => message.add_cc(None, &address, None),
                    AddressRole::Bcc => message.add_bcc(None, &address, None),
                    AddressRole::From => message.add_from(None, &address, None),
                    AddressRole::ReplyTo => message.add_reply_to(None, &address, None),
                    _ => message.add_read_receipt_to(None, &address, None),
                }
                .unwrap();
                expected.push((role, address));
            }

            for role in [
                AddressRole::To,
                AddressRole::Cc,
                AddressRole::Bcc,
                AddressRole::From,
                AddressRole::ReplyTo,
                AddressRole::ReadReceiptTo,
            ] {
                let actual: Vec<&str> = message.addresses_for(role).map(Address::as_str).collect();
                let wanted: Vec<&str> = expected
                    .iter()
                    .filter(|(r, _)| *r == role)
                    .map(|(_, a)| a.as_str())
                    .collect();
                prop_assert_eq!(actual, wanted);
            }
        }
    }
}
