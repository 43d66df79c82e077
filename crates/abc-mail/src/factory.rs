//! Factories creating fresh mail messages.

use crate::collaborator::{
    BlobStore, MessageIdGenerator, TimestampMessageIdGenerator, Transport, UserDirectory,
};
use crate::config::MailConfig;
use crate::error::Result;
use crate::message::{MailMessage, MessageContext};
use crate::types::ContentIdGenerator;
use std::sync::Arc;

/// Creates mail messages wired to a set of collaborators.
///
/// Every call returns an independent, empty message in the building state.
/// Factories hold no per-message state and can be shared between tasks.
pub trait MailMessageFactory: Send + Sync {
    /// Creates a new, empty message.
    fn create_mail_message(&self) -> MailMessage;
}

/// Factory backed by a blob store, a transport and optional extras.
pub struct DefaultMailMessageFactory {
    context: Arc<MessageContext>,
}

impl DefaultMailMessageFactory {
    /// Creates a factory without validating `config`.
    ///
    /// Prefer [`DefaultMailMessageFactory::try_new`]. Here an unusable
    /// `domain` or `cid_domain` is only logged, and generated IDs fall back
    /// to `localhost`.
    ///
    /// Message-IDs are generated by a [`TimestampMessageIdGenerator`] for
    /// `config.domain`. No user directory is wired.
    #[must_use]
    pub fn new(
        config: MailConfig,
        blob_store: Arc<dyn BlobStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let context = MessageContext {
            blob_store,
            transport,
            directory: None,
            message_ids: Arc::new(TimestampMessageIdGenerator::new(config.domain.clone())),
            content_ids: ContentIdGenerator::new(config.cid_domain()),
            config,
        };

        if let Err(e) = context.config.validate() {
            tracing::warn!(error = %e, "mail factory created with invalid configuration");
        }

        if context.config.is_sandbox() {
            tracing::info!(
                sandbox = ?context.config.sandbox_recipient,
                "mail factory in sandbox mode"
            );
        }

        Self {
            context: Arc::new(context),
        }
    }

    /// Creates a factory after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the configuration is invalid.
    pub fn try_new(
        config: MailConfig,
        blob_store: Arc<dyn BlobStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config, blob_store, transport))
    }

    /// Uses `directory` to fill in display names of directory users.
    #[must_use]
    pub fn with_directory(self, directory: Arc<dyn UserDirectory>) -> Self {
        self.rewire(|context| context.directory = Some(directory))
    }

    /// Uses `generator` for messages without an explicit Message-ID.
    #[must_use]
    pub fn with_message_id_generator(self, generator: Arc<dyn MessageIdGenerator>) -> Self {
        self.rewire(|context| context.message_ids = generator)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MailConfig {
        &self.context.config
    }

    fn rewire(self, apply: impl FnOnce(&mut MessageContext)) -> Self {
        // Messages created earlier keep their own context.
        let mut context = match Arc::try_unwrap(self.context) {
            Ok(context) => context,
            Err(shared) => MessageContext {
                blob_store: shared.blob_store.clone(),
                transport: shared.transport.clone(),
                directory: shared.directory.clone(),
                message_ids: shared.message_ids.clone(),
                content_ids: ContentIdGenerator::new(shared.config.cid_domain()),
                config: shared.config.clone(),
            },
        };
        apply(&mut context);
        Self {
            context: Arc::new(context),
        }
    }
}

impl MailMessageFactory for DefaultMailMessageFactory {
    fn create_mail_message(&self) -> MailMessage {
        MailMessage::new(Arc::clone(&self.context))
    }
}

impl std::fmt::Debug for DefaultMailMessageFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultMailMessageFactory")
            .field("config", &self.context.config)
            .field("has_directory", &self.context.directory.is_some())
            .finish_non_exhaustive()
    }
}
