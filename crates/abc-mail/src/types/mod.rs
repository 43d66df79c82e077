//! Core mail message types.

mod address;
mod content_id;
mod header;
mod identifiers;
mod message_id;
pub(crate) mod syntax;

pub use address::{Address, AddressRole};
pub use content_id::{ContentId, ContentIdGenerator};
pub(crate) use content_id::instance_stamp;
pub use header::{CustomHeader, RESERVED_HEADERS, is_reserved_header};
pub use identifiers::{BlobId, DeliveryId, UserId};
pub use message_id::MessageId;
pub(crate) use syntax::has_control;
