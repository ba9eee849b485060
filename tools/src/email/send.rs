//! email.send — compose and deliver one email
//!
//! Pipeline: normalize recipients → rewrite body → validate attachments →
//! compose → connect → authenticate → send → close.
//! Everything before connect is pre-flight: a failure there means no
//! network activity happened.

use lettre::message::Mailbox;
use lettre::Address;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{AttachmentPolicy, MailConfig, SmtpProfile};
use crate::email::attachments;
use crate::email::body::BodyRewriter;
use crate::email::compose::{compose, ComposedMessage, Draft};
use crate::email::request::SendRequest;
use crate::email::transport::{connector_for, Connector, Session, TransportError};
use crate::error::{FailureKind, MailError, MailResult, Stage};

/// Outcome of one send attempt. There is no partial success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SendResult {
    Success {
        recipient_count: usize,
        response: String,
    },
    Failure {
        kind: FailureKind,
        detail: String,
    },
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        matches!(self, SendResult::Success { .. })
    }
}

impl From<MailError> for SendResult {
    fn from(err: MailError) -> Self {
        SendResult::Failure {
            kind: err.kind(),
            detail: err.to_string(),
        }
    }
}

impl fmt::Display for SendResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendResult::Success {
                recipient_count, ..
            } => write!(f, "Email sent to {recipient_count} recipient(s)"),
            SendResult::Failure { kind, detail } => {
                write!(f, "Failed to send email ({kind}): {detail}")
            }
        }
    }
}

/// Composes and delivers email over SMTP.
///
/// Holds no per-send state, so one `Mailer` can serve concurrent sends;
/// each send opens and closes its own session.
pub struct Mailer {
    profile: SmtpProfile,
    from: Mailbox,
    policy: AttachmentPolicy,
    rewriter: BodyRewriter,
    connector: Arc<dyn Connector>,
}

impl Mailer {
    /// Build a mailer using the client binding named in the config
    pub fn new(config: &MailConfig) -> MailResult<Self> {
        Self::with_connector(config, connector_for(&config.smtp))
    }

    pub fn with_connector(config: &MailConfig, connector: Arc<dyn Connector>) -> MailResult<Self> {
        let address = config
            .sender
            .address
            .parse::<Address>()
            .map_err(|e| MailError::InvalidAddress {
                address: config.sender.address.clone(),
                reason: e.to_string(),
            })?;
        let display_name = config.sender.display_name.trim();
        let name = (!display_name.is_empty()).then(|| display_name.to_string());

        Ok(Self {
            profile: config.smtp.clone(),
            from: Mailbox::new(name, address),
            policy: config.attachments.clone(),
            rewriter: BodyRewriter::new(&config.sender.display_name),
            connector,
        })
    }

    pub async fn send(&self, request: &SendRequest) -> SendResult {
        self.send_with_cancel(request, &CancellationToken::new()).await
    }

    /// Send, aborting the in-flight network step if `cancel` fires.
    /// The session is still closed best-effort.
    pub async fn send_with_cancel(&self, request: &SendRequest, cancel: &CancellationToken) -> SendResult {
        let composed = match self.prepare(request).await {
            Ok(composed) => composed,
            Err(e) if e.kind().is_preflight() => {
                warn!("Email rejected before sending: {e}");
                return e.into();
            }
            Err(e) => {
                warn!("Email could not be composed: {e}");
                return e.into();
            }
        };

        info!(
            "Sending email to {} recipient(s) via {}:{}",
            composed.recipient_count(),
            self.profile.host,
            self.profile.port
        );

        match self.deliver(&composed, cancel).await {
            Ok(response) => {
                info!("Email delivered: {response}");
                SendResult::Success {
                    recipient_count: composed.recipient_count(),
                    response,
                }
            }
            Err(e) => {
                warn!("Email delivery failed: {e}");
                e.into()
            }
        }
    }

    /// Every pre-flight step: recipients, body, attachments, composition
    pub async fn prepare(&self, request: &SendRequest) -> MailResult<ComposedMessage> {
        let recipients = request.resolve_recipients()?;
        let body = self.rewriter.apply(&request.body, request.is_html);
        let validated = attachments::validate(&request.attachments, &self.policy)?;
        let loaded = attachments::load(&validated, &self.policy).await?;

        compose(Draft {
            from: &self.from,
            recipients: &recipients,
            subject: &request.subject,
            body,
            is_html: request.is_html,
            attachments: loaded,
        })
    }

    async fn deliver(&self, composed: &ComposedMessage, cancel: &CancellationToken) -> MailResult<String> {
        let mut session = self
            .step(Stage::Connect, cancel, self.connector.connect(&self.profile))
            .await?;
        debug!("Connected to {}:{}", self.profile.host, self.profile.port);

        let outcome = self.transact(session.as_mut(), composed, cancel).await;

        // Close even after a failed step; a close failure never changes the outcome.
        let close = self.bounded(Stage::Close, session.close()).await;
        if let Err(e) = close {
            warn!("Closing SMTP session failed: {e}");
        }

        outcome
    }

    async fn transact(
        &self,
        session: &mut dyn Session,
        composed: &ComposedMessage,
        cancel: &CancellationToken,
    ) -> MailResult<String> {
        if self.profile.has_credentials() {
            self.step(
                Stage::Authenticate,
                cancel,
                session.authenticate(&self.profile.username, &self.profile.password),
            )
            .await?;
            debug!("Authenticated as {}", self.profile.username);
        }

        self.step(
            Stage::Send,
            cancel,
            session.send(composed.envelope(), composed.formatted()),
        )
        .await
    }

    /// One cancellable, time-bounded transport step
    async fn step<T, F>(&self, stage: Stage, cancel: &CancellationToken, fut: F) -> MailResult<T>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MailError::Cancelled(stage)),
            result = self.bounded(stage, fut) => result,
        }
    }

    async fn bounded<T, F>(&self, stage: Stage, fut: F) -> MailResult<T>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        match tokio::time::timeout(self.profile.timeout(), fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(stage.failure(e.to_string())),
            Err(_) => Err(stage.failure(format!(
                "{stage} timed out after {}s",
                self.profile.timeout_secs
            ))),
        }
    }
}
