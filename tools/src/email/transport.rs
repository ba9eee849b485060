//! SMTP session plumbing
//!
//! `Connector` opens one session per send; `Session` walks it through
//! authenticate → send → close. Two lettre-backed bindings are provided:
//! the tokio client and the blocking client driven from `spawn_blocking`.

use async_trait::async_trait;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{AsyncSmtpConnection, SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Response;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{Binding, SmtpProfile, TlsMode};

const MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

/// Failure reported by a transport step; the caller classifies it by stage
#[derive(Debug, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self(detail.into())
    }
}

impl From<lettre::transport::smtp::Error> for TransportError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        Self(err.to_string())
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a session to `host:port`, encrypted as the profile requires
    async fn connect(&self, profile: &SmtpProfile) -> Result<Box<dyn Session>, TransportError>;
}

#[async_trait]
pub trait Session: Send {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), TransportError>;

    /// Submit the message to every envelope recipient; returns the server reply
    async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Pick the client binding configured for this profile
pub fn connector_for(profile: &SmtpProfile) -> Arc<dyn Connector> {
    match profile.binding {
        Binding::Async => Arc::new(AsyncConnector),
        Binding::Blocking => Arc::new(BlockingConnector),
    }
}

fn describe(response: &Response) -> String {
    format!(
        "{} {}",
        response.code(),
        response.message().collect::<Vec<&str>>().join(" ")
    )
}

fn tls_parameters(profile: &SmtpProfile) -> Result<TlsParameters, TransportError> {
    TlsParameters::new(profile.host.clone()).map_err(TransportError::from)
}

// ---------------------------------------------------------------------------
// tokio binding
// ---------------------------------------------------------------------------

pub struct AsyncConnector;

#[async_trait]
impl Connector for AsyncConnector {
    async fn connect(&self, profile: &SmtpProfile) -> Result<Box<dyn Session>, TransportError> {
        let hello = ClientId::default();
        let mode = profile.tls_mode();
        let wrapper = match mode {
            TlsMode::Implicit => Some(tls_parameters(profile)?),
            TlsMode::StartTls | TlsMode::None => None,
        };

        let mut conn = AsyncSmtpConnection::connect_tokio1(
            (profile.host.as_str(), profile.port),
            Some(profile.timeout()),
            &hello,
            wrapper,
            None,
        )
        .await?;

        if mode == TlsMode::StartTls {
            if !conn.can_starttls() {
                conn.abort().await;
                return Err(TransportError::new(format!(
                    "{} does not offer STARTTLS",
                    profile.host
                )));
            }
            conn.starttls(tls_parameters(profile)?, &hello).await?;
            debug!("STARTTLS upgrade with {} complete", profile.host);
        }

        Ok(Box::new(AsyncSession { conn }))
    }
}

struct AsyncSession {
    conn: AsyncSmtpConnection,
}

#[async_trait]
impl Session for AsyncSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.conn.auth(MECHANISMS, &credentials).await?;
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String, TransportError> {
        let response = self.conn.send(envelope, message).await?;
        Ok(describe(&response))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Err(e) = self.conn.quit().await {
            self.conn.abort().await;
            return Err(e.into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// blocking binding
// ---------------------------------------------------------------------------

pub struct BlockingConnector;

#[async_trait]
impl Connector for BlockingConnector {
    async fn connect(&self, profile: &SmtpProfile) -> Result<Box<dyn Session>, TransportError> {
        let profile = profile.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<SmtpConnection, TransportError> {
            let hello = ClientId::default();
            let mode = profile.tls_mode();
            let wrapper = match mode {
                TlsMode::Implicit => Some(tls_parameters(&profile)?),
                TlsMode::StartTls | TlsMode::None => None,
            };

            let mut conn = SmtpConnection::connect(
                (profile.host.as_str(), profile.port),
                Some(profile.timeout()),
                &hello,
                wrapper.as_ref(),
                None,
            )?;

            if mode == TlsMode::StartTls {
                if !conn.can_starttls() {
                    conn.abort();
                    return Err(TransportError::new(format!(
                        "{} does not offer STARTTLS",
                        profile.host
                    )));
                }
                conn.starttls(&tls_parameters(&profile)?, &hello)?;
            }
            Ok(conn)
        })
        .await
        .map_err(|e| TransportError::new(format!("connect task failed: {e}")))??;

        Ok(Box::new(BlockingSession { conn: Some(conn) }))
    }
}

/// The connection moves into the blocking pool for each step and comes back
/// afterwards. If a step is abandoned (timeout, cancellation) the connection
/// stays with the worker thread and is dropped there, which closes the socket.
struct BlockingSession {
    conn: Option<SmtpConnection>,
}

impl BlockingSession {
    async fn run<T, F>(&mut self, step: &'static str, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SmtpConnection) -> Result<T, lettre::transport::smtp::Error> + Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| TransportError::new("session is no longer open"))?;
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await
        .map_err(|e| TransportError::new(format!("{step} task failed: {e}")))?;
        self.conn = Some(conn);
        result.map_err(TransportError::from)
    }
}

#[async_trait]
impl Session for BlockingSession {
    async fn authenticate(&mut self, username: &str, password: &str) -> Result<(), TransportError> {
        let credentials = Credentials::new(username.to_string(), password.to_string());
        self.run("authenticate", move |conn| conn.auth(MECHANISMS, &credentials))
            .await?;
        Ok(())
    }

    async fn send(&mut self, envelope: &Envelope, message: &[u8]) -> Result<String, TransportError> {
        let envelope = envelope.clone();
        let message = message.to_vec();
        let response = self
            .run("send", move |conn| conn.send(&envelope, &message))
            .await?;
        Ok(describe(&response))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.conn.is_none() {
            return Ok(());
        }
        let result = self
            .run("close", |conn| {
                let quit = conn.quit();
                if quit.is_err() {
                    conn.abort();
                }
                quit
            })
            .await;
        self.conn = None;
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MailConfig;
    use crate::email::request::SendRequest;
    use crate::email::send::{Mailer, SendResult};
    use crate::error::FailureKind;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Plaintext SMTP responder for a single session. It never offers
    /// STARTTLS and returns every command it received.
    fn smtp_server() -> (u16, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            let mut seen = Vec::new();
            writer.write_all(b"220 mx.test ESMTP\r\n").unwrap();

            let mut in_data = false;
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let command = line.trim_end().to_string();
                if in_data {
                    if command == "." {
                        in_data = false;
                        let _ = writer.write_all(b"250 2.0.0 queued as 42\r\n");
                    }
                    continue;
                }

                let verb = command
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_ascii_uppercase();
                let reply = match verb.as_str() {
                    "EHLO" => "250-mx.test\r\n250 AUTH PLAIN LOGIN\r\n",
                    "AUTH" => "235 2.7.0 accepted\r\n",
                    "MAIL" | "RCPT" => "250 2.1.0 ok\r\n",
                    "DATA" => {
                        in_data = true;
                        "354 go ahead\r\n"
                    }
                    "QUIT" => "221 2.0.0 bye\r\n",
                    _ => "502 5.5.2 unsupported\r\n",
                };
                seen.push(command);
                let _ = writer.write_all(reply.as_bytes());
                if verb == "QUIT" {
                    break;
                }
            }
            seen
        });
        (port, handle)
    }

    fn local_config(port: u16, tls: TlsMode, binding: Binding) -> MailConfig {
        let mut config = MailConfig::default();
        config.smtp = SmtpProfile {
            host: "127.0.0.1".into(),
            port,
            username: "robot".into(),
            password: "secret".into(),
            tls: Some(tls),
            timeout_secs: 5,
            binding,
        };
        config.sender.address = "robot@example.com".into();
        config
    }

    async fn deliver_over(binding: Binding) {
        let (port, server) = smtp_server();
        let mailer = Mailer::new(&local_config(port, TlsMode::None, binding)).unwrap();
        let request = SendRequest::new("a@x.com; b@x.com", "Status", "all green").with_cc("c@x.com");

        let result = mailer.send(&request).await;
        assert!(
            matches!(result, SendResult::Success { recipient_count: 3, .. }),
            "{binding:?}: {result}"
        );

        let seen = server.join().unwrap();
        assert!(seen[0].starts_with("EHLO "), "{seen:?}");
        assert!(seen[1].starts_with("AUTH PLAIN "), "{seen:?}");
        assert_eq!(seen[2], "MAIL FROM:<robot@example.com>");
        let rcpts: Vec<&str> = seen
            .iter()
            .filter(|c| c.starts_with("RCPT"))
            .map(String::as_str)
            .collect();
        assert_eq!(
            rcpts,
            ["RCPT TO:<a@x.com>", "RCPT TO:<b@x.com>", "RCPT TO:<c@x.com>"]
        );
        assert_eq!(seen[seen.len() - 2], "DATA");
        assert_eq!(seen[seen.len() - 1], "QUIT");
    }

    async fn require_starttls_over(binding: Binding) {
        let (port, server) = smtp_server();
        let mailer = Mailer::new(&local_config(port, TlsMode::StartTls, binding)).unwrap();
        let request = SendRequest::new("a@x.com", "Status", "all green");

        match mailer.send(&request).await {
            SendResult::Failure { kind, detail } => {
                assert_eq!(kind, FailureKind::ConnectionError, "{binding:?}");
                assert!(detail.contains("does not offer STARTTLS"), "{detail}");
            }
            other => panic!("{binding:?}: unexpected result: {other}"),
        }

        let seen = server.join().unwrap();
        assert!(!seen.iter().any(|c| c.starts_with("AUTH") || c.starts_with("MAIL")), "{seen:?}");
    }

    #[tokio::test]
    async fn test_async_binding_delivers_to_every_recipient() {
        deliver_over(Binding::Async).await;
    }

    #[tokio::test]
    async fn test_blocking_binding_delivers_to_every_recipient() {
        deliver_over(Binding::Blocking).await;
    }

    #[tokio::test]
    async fn test_async_binding_requires_starttls() {
        require_starttls_over(Binding::Async).await;
    }

    #[tokio::test]
    async fn test_blocking_binding_requires_starttls() {
        require_starttls_over(Binding::Blocking).await;
    }

    #[test]
    fn test_connector_follows_binding() {
        // Both bindings are usable through the same trait object
        let mut profile = SmtpProfile::default();
        let _async: Arc<dyn Connector> = connector_for(&profile);
        profile.binding = Binding::Blocking;
        let _blocking: Arc<dyn Connector> = connector_for(&profile);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::new("connection timed out");
        assert_eq!(err.to_string(), "connection timed out");
    }

    #[tokio::test]
    async fn test_async_connect_refused_is_error() {
        // Bind then drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let profile = SmtpProfile {
            host: "127.0.0.1".into(),
            port,
            tls: Some(TlsMode::None),
            timeout_secs: 2,
            ..SmtpProfile::default()
        };
        assert!(AsyncConnector.connect(&profile).await.is_err());
    }

    #[tokio::test]
    async fn test_blocking_connect_refused_is_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let profile = SmtpProfile {
            host: "127.0.0.1".into(),
            port,
            tls: Some(TlsMode::None),
            timeout_secs: 2,
            binding: Binding::Blocking,
            ..SmtpProfile::default()
        };
        assert!(BlockingConnector.connect(&profile).await.is_err());
    }
}
