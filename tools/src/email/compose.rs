//! MIME composition
//!
//! Builds the RFC 5322 message and its SMTP envelope. No I/O happens here:
//! attachment bytes arrive already loaded.

use lettre::address::Envelope;
use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::Message;

use crate::email::attachments::AttachmentData;
use crate::email::request::Recipients;
use crate::error::{MailError, MailResult};

/// A fully formatted message plus the envelope it travels in.
///
/// Fields are private; once built the message cannot change.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    envelope: Envelope,
    formatted: Vec<u8>,
    recipient_count: usize,
}

impl ComposedMessage {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn formatted(&self) -> &[u8] {
        &self.formatted
    }

    pub fn recipient_count(&self) -> usize {
        self.recipient_count
    }
}

/// Everything composition needs, borrowed from the send pipeline
pub struct Draft<'a> {
    pub from: &'a Mailbox,
    pub recipients: &'a Recipients,
    pub subject: &'a str,
    pub body: String,
    pub is_html: bool,
    pub attachments: Vec<AttachmentData>,
}

pub fn compose(draft: Draft<'_>) -> MailResult<ComposedMessage> {
    let mut builder = Message::builder()
        .from(draft.from.clone())
        .subject(draft.subject);
    for addr in &draft.recipients.to {
        builder = builder.to(Mailbox::new(None, addr.clone()));
    }
    for addr in &draft.recipients.cc {
        builder = builder.cc(Mailbox::new(None, addr.clone()));
    }

    let content_type = if draft.is_html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };
    let text = SinglePart::builder().header(content_type).body(draft.body);

    let message = if draft.attachments.is_empty() {
        builder.singlepart(text)
    } else {
        let mut mixed = MultiPart::mixed().singlepart(text);
        for attachment in draft.attachments {
            let body = Body::new_with_encoding(attachment.bytes, ContentTransferEncoding::Base64)
                .map_err(|_| {
                    MailError::Unknown(format!("cannot encode attachment {}", attachment.filename))
                })?;
            mixed = mixed
                .singlepart(Attachment::new(attachment.filename).body(body, attachment.content_type));
        }
        builder.multipart(mixed)
    }
    .map_err(|e| MailError::Unknown(format!("failed to build message: {e}")))?;

    let envelope = Envelope::new(Some(draft.from.email.clone()), draft.recipients.envelope())
        .map_err(|e| MailError::Unknown(format!("failed to build envelope: {e}")))?;

    Ok(ComposedMessage {
        envelope,
        formatted: message.formatted(),
        recipient_count: draft.recipients.count(),
    })
}
