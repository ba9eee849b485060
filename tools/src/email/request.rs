//! Send requests and recipient normalization

use lettre::Address;
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{MailError, MailResult};

const SUBJECT_ADVISORY_LEN: usize = 120;

/// Recipients as the agent supplies them: one `;`-delimited string or a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RecipientInput {
    Delimited(String),
    List(Vec<String>),
}

impl Default for RecipientInput {
    fn default() -> Self {
        RecipientInput::List(Vec::new())
    }
}

impl From<&str> for RecipientInput {
    fn from(value: &str) -> Self {
        RecipientInput::Delimited(value.to_string())
    }
}

impl From<Vec<String>> for RecipientInput {
    fn from(value: Vec<String>) -> Self {
        RecipientInput::List(value)
    }
}

impl From<Vec<&str>> for RecipientInput {
    fn from(value: Vec<&str>) -> Self {
        RecipientInput::List(value.into_iter().map(String::from).collect())
    }
}

impl RecipientInput {
    /// Trimmed, blank-free addresses in their original order
    pub fn normalize(&self) -> Vec<String> {
        let entries: Vec<&str> = match self {
            RecipientInput::Delimited(raw) => raw.split(';').collect(),
            RecipientInput::List(items) => items.iter().map(String::as_str).collect(),
        };
        entries
            .into_iter()
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(String::from)
            .collect()
    }
}

/// A single email to deliver
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    #[serde(alias = "recipients")]
    pub recipient: RecipientInput,
    #[serde(default)]
    pub cc: RecipientInput,
    pub subject: String,
    #[serde(alias = "content")]
    pub body: String,
    #[serde(default = "default_is_html")]
    pub is_html: bool,
    #[serde(default)]
    pub attachments: Vec<PathBuf>,
}

fn default_is_html() -> bool {
    true
}

/// Recipients after normalization and address parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipients {
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
}

impl Recipients {
    /// Envelope order: primary recipients first, then CC
    pub fn envelope(&self) -> Vec<Address> {
        self.to.iter().chain(self.cc.iter()).cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.to.len() + self.cc.len()
    }
}

impl SendRequest {
    pub fn new(recipient: impl Into<RecipientInput>, subject: &str, body: &str) -> Self {
        Self {
            recipient: recipient.into(),
            cc: RecipientInput::default(),
            subject: subject.to_string(),
            body: body.to_string(),
            is_html: false,
            attachments: Vec::new(),
        }
    }

    pub fn with_cc(mut self, cc: impl Into<RecipientInput>) -> Self {
        self.cc = cc.into();
        self
    }

    pub fn html(mut self, is_html: bool) -> Self {
        self.is_html = is_html;
        self
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Normalized primary recipients; empty is an error
    pub fn normalized_recipients(&self) -> MailResult<Vec<String>> {
        let to = self.recipient.normalize();
        if to.is_empty() {
            return Err(MailError::EmptyRecipients);
        }
        Ok(to)
    }

    /// Normalize and parse every address before anything touches the network
    pub fn resolve_recipients(&self) -> MailResult<Recipients> {
        let to = parse_all(&self.normalized_recipients()?)?;
        let cc = parse_all(&self.cc.normalize())?;
        if self.subject.chars().count() > SUBJECT_ADVISORY_LEN {
            tracing::debug!(
                "Subject is {} characters, longer than the advised {SUBJECT_ADVISORY_LEN}",
                self.subject.chars().count()
            );
        }
        Ok(Recipients { to, cc })
    }
}

fn parse_all(addresses: &[String]) -> MailResult<Vec<Address>> {
    addresses
        .iter()
        .map(|addr| {
            addr.parse::<Address>()
                .map_err(|e| MailError::InvalidAddress {
                    address: addr.clone(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;

    #[test]
    fn test_delimited_normalization_drops_blanks() {
        let input = RecipientInput::from("a@x.com; ; b@x.com");
        assert_eq!(input.normalize(), vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn test_list_normalization_trims_and_keeps_order() {
        let input = RecipientInput::from(vec!["  c@x.com", "", "   ", "a@x.com "]);
        assert_eq!(input.normalize(), vec!["c@x.com", "a@x.com"]);
    }

    #[test]
    fn test_all_blank_is_empty_recipients() {
        for input in [
            RecipientInput::from(""),
            RecipientInput::from(" ; ;  "),
            RecipientInput::from(vec!["", " "]),
            RecipientInput::default(),
        ] {
            let req = SendRequest {
                recipient: input,
                ..SendRequest::new("", "s", "b")
            };
            let err = req.normalized_recipients().unwrap_err();
            assert_eq!(err.kind(), FailureKind::EmptyRecipients);
        }
    }

    #[test]
    fn test_resolve_builds_envelope_in_order() {
        let req = SendRequest::new("a@x.com; b@x.com", "s", "b").with_cc(vec!["c@x.com"]);
        let recipients = req.resolve_recipients().unwrap();
        let envelope: Vec<String> = recipients.envelope().iter().map(|a| a.to_string()).collect();
        assert_eq!(envelope, vec!["a@x.com", "b@x.com", "c@x.com"]);
        assert_eq!(recipients.count(), 3);
    }

    #[test]
    fn test_invalid_address_rejected() {
        let req = SendRequest::new("not-an-address", "s", "b");
        let err = req.resolve_recipients().unwrap_err();
        assert_eq!(err.kind(), FailureKind::InvalidAddress);
        assert!(err.to_string().contains("not-an-address"));

        let bad_cc = SendRequest::new("a@x.com", "s", "b").with_cc(vec!["@@"]);
        assert_eq!(
            bad_cc.resolve_recipients().unwrap_err().kind(),
            FailureKind::InvalidAddress
        );
    }

    #[test]
    fn test_deserialize_tool_shapes() {
        let req: SendRequest = serde_json::from_value(serde_json::json!({
            "recipient": "a@x.com;b@x.com",
            "subject": "Hi",
            "content": "<p>Hello</p>",
            "cc": ["c@x.com"]
        }))
        .unwrap();
        assert_eq!(req.recipient.normalize().len(), 2);
        assert_eq!(req.body, "<p>Hello</p>");
        assert!(req.is_html);
        assert!(req.attachments.is_empty());

        let req: SendRequest = serde_json::from_value(serde_json::json!({
            "recipients": ["a@x.com"],
            "subject": "Hi",
            "body": "plain",
            "is_html": false,
            "attachments": ["/tmp/report.pdf"]
        }))
        .unwrap();
        assert_eq!(req.recipient, RecipientInput::List(vec!["a@x.com".into()]));
        assert!(!req.is_html);
        assert_eq!(req.attachments, vec![PathBuf::from("/tmp/report.pdf")]);
    }
}
