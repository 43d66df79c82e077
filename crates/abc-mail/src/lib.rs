//! # abc-mail
//!
//! Fluent builder for composing and sending email, plus the contracts of the
//! collaborators it relies on.
//!
//! ## Features
//!
//! - **Builder**: add recipients, custom headers, attachments, embedded
//!   objects, a body, subject and Message-ID with chainable calls
//! - **Single use**: a message moves from building to sent exactly once;
//!   later changes are rejected
//! - **Eager validation**: malformed addresses, reserved headers and bad
//!   Message-IDs fail at call time and leave the message untouched
//! - **Pluggable collaborators**: blob storage, user directory, Message-ID
//!   generation and delivery are traits
//! - **In-memory collaborators** for tests and sandbox setups
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use abc_mail::memory::{MemoryBlobStore, MemoryTransport};
//! use abc_mail::{DefaultMailMessageFactory, MailConfig, MailMessageFactory};
//!
//! #[tokio::main]
//! async fn main() -> abc_mail::Result<()> {
//!     let store = Arc::new(MemoryBlobStore::new());
//!     let body = store.insert(b"Hello, World!".to_vec(), "text/plain; charset=utf-8");
//!
//!     let factory = DefaultMailMessageFactory::try_new(
//!         MailConfig::new("example.com"),
//!         store,
//!         Arc::new(MemoryTransport::new()),
//!     )?;
//!
//!     let mut message = factory.create_mail_message();
//!     message
//!         .add_to(None, "recipient@example.com", Some("Recipient"))?
//!         .set_sender(None, "sender@example.com", Some("Sender"))?
//!         .add_custom_header(Some("X-Campaign"), Some("welcome"))?
//!         .set_subject("Welcome")?
//!         .set_body(body)?;
//!
//!     let delivery_id = message.send().await?;
//!     println!("delivered as {delivery_id}");
//!     Ok(())
//! }
//! ```
//!
//! ## Embedding Objects
//!
//! ```ignore
//! let cid = message.embed(logo_blob)?;
//! let html = format!(r#"<img src="{}">"#, cid.url());
//! ```
//!
//! ## Modules
//!
//! - [`memory`]: In-memory blob store, user directory and transport
//! - [`types`]: Addresses, headers, identifiers, Message-IDs and Content-IDs

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod collaborator;
mod config;
mod error;
mod factory;
pub mod memory;
mod message;
mod outgoing;
pub mod types;

pub use collaborator::{
    Blob, BlobStore, DirectoryEntry, MessageIdGenerator, TimestampMessageIdGenerator, Transport,
    UserDirectory,
};
pub use config::MailConfig;
pub use error::{Error, Result};
pub use factory::{DefaultMailMessageFactory, MailMessageFactory};
pub use message::{MailMessage, MessageState};
pub use outgoing::{EmbeddedBlob, OutgoingMessage};
pub use types::{
    Address, AddressRole, BlobId, ContentId, CustomHeader, DeliveryId, MessageId, UserId,
};
