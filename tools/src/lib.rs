//! Agent email tool
//!
//! Composes MIME messages (plain or HTML, optional CC and attachments) and
//! delivers them over SMTP, reporting a classified result instead of
//! propagating failures.

pub mod config;
pub mod email;
pub mod error;
pub mod schema;

pub use config::{MailConfig, SmtpProfile};
pub use email::request::{RecipientInput, SendRequest};
pub use email::send::{Mailer, SendResult};
pub use email::EmailTool;
pub use error::{FailureKind, MailError};
