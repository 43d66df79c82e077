//! Fully assembled message handed to a [`Transport`](crate::Transport).

use crate::collaborator::Blob;
use crate::types::{Address, AddressRole, ContentId, CustomHeader, MessageId};

/// Blob rendered inline and referenced from the body by Content-ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBlob {
    /// Content-ID handed out by [`MailMessage::embed`](crate::MailMessage::embed).
    pub content_id: ContentId,
    /// Resolved object.
    pub blob: Blob,
}

/// A message ready for delivery.
///
/// All blobs are resolved and the Message-ID is final. The transport decides
/// how to turn this into MIME and put it on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Final Message-ID.
    pub message_id: MessageId,
    /// Addresses in insertion order, including the sender.
    pub addresses: Vec<(AddressRole, Address)>,
    /// Subject line.
    pub subject: String,
    /// Caller-supplied headers in insertion order.
    pub custom_headers: Vec<CustomHeader>,
    /// Envelope sender (`MAIL FROM`).
    pub envelope_from: String,
    /// Envelope recipients (`RCPT TO`).
    pub envelope_to: Vec<String>,
    /// Message body.
    pub body: Option<Blob>,
    /// Attachments in insertion order.
    pub attachments: Vec<Blob>,
    /// Embedded objects in insertion order.
    pub embedded: Vec<EmbeddedBlob>,
}

impl OutgoingMessage {
    /// Returns the addresses with the given role, in insertion order.
    pub fn addresses_for(&self, role: AddressRole) -> impl Iterator<Item = &Address> {
        self.addresses
            .iter()
            .filter(move |(r, _)| *r == role)
            .map(|(_, address)| address)
    }

    /// Returns the header fields in the order they should be written.
    ///
    /// Bcc recipients only appear in the envelope, never in the headers.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        const ADDRESS_HEADERS: [AddressRole; 6] = [
            AddressRole::From,
            AddressRole::Sender,
            AddressRole::ReplyTo,
            AddressRole::To,
            AddressRole::Cc,
            AddressRole::ReadReceiptTo,
        ];

        let mut headers = Vec::new();

        for role in ADDRESS_HEADERS {
            let values: Vec<String> = self
                .addresses_for(role)
                .map(Address::to_header_value)
                .collect();
            if !values.is_empty() {
                headers.push((role.header_name().to_string(), values.join(", ")));
            }
        }

        headers.push(("Subject".to_string(), self.subject.clone()));
        headers.push(("Message-ID".to_string(), self.message_id.to_string()));

        for header in &self.custom_headers {
            headers.push((header.name.clone(), header.value.clone()));
        }

        headers
    }

    /// Returns the first value of a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers()
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Renders the header block, each field terminated by CRLF.
    #[must_use]
    pub fn render_headers(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.headers() {
            out.push_str(&name);
            out.push_str(": ");
            out.push_str(&value);
            out.push_str("\r\n");
        }
        out
    }

    /// Returns the number of envelope recipients.
    #[must_use]
    pub fn recipient_count(&self) -> usize {
        self.envelope_to.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use crate::types::BlobId;

    fn address(addr: &str, name: Option<&str>) -> Address {
        Address::new(None, addr, name).unwrap()
    }

    fn sample() -> OutgoingMessage {
        OutgoingMessage {
            message_id: MessageId::parse("1@example.com").unwrap(),
            addresses: vec![
                (AddressRole::To, address("a@example.com", Some("A"))),
                (AddressRole::Bcc, address("hidden@example.com", None)),
                (AddressRole::From, address("s@example.com", None)),
                (AddressRole::To, address("b@example.com", None)),
                (AddressRole::ReadReceiptTo, address("s@example.com", None)),
            ],
            subject: "Hi".to_string(),
            custom_headers: vec![CustomHeader::new("X-Campaign", "spring").unwrap()],
            envelope_from: "s@example.com".to_string(),
            envelope_to: vec![
                "a@example.com".to_string(),
                "b@example.com".to_string(),
                "hidden@example.com".to_string(),
            ],
            body: Some(Blob::new(BlobId::new(42), b"Hello".to_vec(), "text/plain")),
            attachments: Vec::new(),
            embedded: Vec::new(),
        }
    }

    #[test]
    fn test_headers_order_and_grouping() {
        let names: Vec<String> = sample().headers().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            [
                "From",
                "To",
                "Disposition-Notification-To",
                "Subject",
                "Message-ID",
                "X-Campaign"
            ]
        );
    }

    #[test]
    fn test_bcc_not_in_headers() {
        let message = sample();
        assert!(message.header("Bcc").is_none());
        assert!(!message.render_headers().contains("hidden@example.com"));
        assert_eq!(message.recipient_count(), 3);
    }

    #[test]
    fn test_header_lookup() {
        let message = sample();
        assert_eq!(
            message.header("to").as_deref(),
            Some("A <a@example.com>, <b@example.com>")
        );
        assert_eq!(message.header("message-id").as_deref(), Some("<1@example.com>"));
    }

    #[test]
    fn test_render_headers() {
        let rendered = sample().render_headers();
        assert!(rendered.starts_with("From: <s@example.com>\r\n"));
        assert!(rendered.contains("Subject: Hi\r\n"));
        assert!(rendered.ends_with("X-Campaign: spring\r\n"));
    }
}
