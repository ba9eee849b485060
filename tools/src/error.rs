//! Failure taxonomy for email delivery

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Stage of the SMTP session a failure or cancellation happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Connect,
    Authenticate,
    Send,
    Close,
}

impl Stage {
    /// Classify a transport failure detail by the stage that produced it
    pub fn failure(self, detail: impl Into<String>) -> MailError {
        let detail = detail.into();
        match self {
            Stage::Connect => MailError::Connection(detail),
            Stage::Authenticate => MailError::Authentication(detail),
            Stage::Send => MailError::Transmission(detail),
            Stage::Close => MailError::Unknown(detail),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Connect => "connect",
            Stage::Authenticate => "authenticate",
            Stage::Send => "send",
            Stage::Close => "close",
        };
        f.write_str(name)
    }
}

/// Classified failure kinds reported back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    EmptyRecipients,
    InvalidAddress,
    AttachmentNotFound,
    AttachmentTooLarge,
    ForbiddenAttachmentType,
    ConnectionError,
    AuthenticationError,
    TransmissionError,
    Cancelled,
    UnknownError,
}

impl FailureKind {
    /// True for failures detected before any network activity
    pub fn is_preflight(self) -> bool {
        matches!(
            self,
            FailureKind::EmptyRecipients
                | FailureKind::InvalidAddress
                | FailureKind::AttachmentNotFound
                | FailureKind::AttachmentTooLarge
                | FailureKind::ForbiddenAttachmentType
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("no valid recipient address")]
    EmptyRecipients,

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("attachment not found: {}", .path.display())]
    AttachmentNotFound { path: PathBuf },

    #[error("attachment too large: {} is {size} bytes (limit {limit})", .path.display())]
    AttachmentTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("forbidden attachment type: {}", .path.display())]
    ForbiddenAttachmentType { path: PathBuf },

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transmission failed: {0}")]
    Transmission(String),

    #[error("cancelled during {0}")]
    Cancelled(Stage),

    #[error("{0}")]
    Unknown(String),
}

impl MailError {
    pub fn kind(&self) -> FailureKind {
        match self {
            MailError::EmptyRecipients => FailureKind::EmptyRecipients,
            MailError::InvalidAddress { .. } => FailureKind::InvalidAddress,
            MailError::AttachmentNotFound { .. } => FailureKind::AttachmentNotFound,
            MailError::AttachmentTooLarge { .. } => FailureKind::AttachmentTooLarge,
            MailError::ForbiddenAttachmentType { .. } => FailureKind::ForbiddenAttachmentType,
            MailError::Connection(_) => FailureKind::ConnectionError,
            MailError::Authentication(_) => FailureKind::AuthenticationError,
            MailError::Transmission(_) => FailureKind::TransmissionError,
            MailError::Cancelled(_) => FailureKind::Cancelled,
            MailError::Unknown(_) => FailureKind::UnknownError,
        }
    }
}

pub type MailResult<T> = std::result::Result<T, MailError>;
