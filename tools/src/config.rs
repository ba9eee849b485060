//! Mail tool configuration loading and parsing

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "/etc/mail-tools/config.toml";
const CONFIG_ENV: &str = "MAIL_TOOLS_CONFIG";
const PASSWORD_ENV: &str = "MAIL_TOOLS_SMTP_PASSWORD";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MailConfig {
    #[serde(default)]
    pub smtp: SmtpProfile,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub attachments: AttachmentPolicy,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the session is secured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Plaintext for the whole session
    None,
    /// Plaintext connect followed by a STARTTLS upgrade
    StartTls,
    /// Encrypted from the first byte (SMTPS)
    Implicit,
}

/// Which SMTP client drives the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Binding {
    #[default]
    Async,
    Blocking,
}

#[derive(Clone, Deserialize)]
pub struct SmtpProfile {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Unset means: implicit TLS on 465, STARTTLS everywhere else
    #[serde(default)]
    pub tls: Option<TlsMode>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub binding: Binding,
}

impl Default for SmtpProfile {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            password: String::new(),
            tls: None,
            timeout_secs: default_timeout(),
            binding: Binding::default(),
        }
    }
}

impl SmtpProfile {
    pub fn tls_mode(&self) -> TlsMode {
        match self.tls {
            Some(mode) => mode,
            None if self.port == 465 => TlsMode::Implicit,
            None => TlsMode::StartTls,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Open relays and local test servers take no credentials
    pub fn has_credentials(&self) -> bool {
        !(self.username.is_empty() && self.password.is_empty())
    }
}

// Keeps the password out of logs.
impl fmt::Debug for SmtpProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpProfile")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("tls", &self.tls_mode())
            .field("timeout_secs", &self.timeout_secs)
            .field("binding", &self.binding)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            display_name: default_display_name(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentPolicy {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_forbidden_extensions")]
    pub forbidden_extensions: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            forbidden_extensions: default_forbidden_extensions(),
        }
    }
}

impl AttachmentPolicy {
    /// Case-insensitive, accepts entries written with or without the dot
    pub fn is_forbidden(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.forbidden_extensions
            .iter()
            .any(|blocked| blocked.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value functions
fn default_port() -> u16 { 587 }
fn default_timeout() -> u64 { 10 }
fn default_display_name() -> String { "OpenManus".into() }
fn default_max_bytes() -> u64 { 25 * 1024 * 1024 }
fn default_forbidden_extensions() -> Vec<String> {
    vec!["exe".into(), "bat".into(), "sh".into()]
}
fn default_log_level() -> String { "info".into() }

impl MailConfig {
    /// Fill derived fields: the SMTP login defaults to the sender address
    fn finalize(mut self) -> Self {
        if self.smtp.username.is_empty() && !self.smtp.password.is_empty() {
            self.smtp.username = self.sender.address.clone();
        }
        self
    }

    /// Reject configurations that cannot possibly send
    pub fn validate(&self) -> Result<()> {
        if self.smtp.host.trim().is_empty() {
            bail!("smtp.host is not configured");
        }
        if self.sender.address.trim().is_empty() {
            bail!("sender.address is not configured");
        }
        if self.smtp.timeout_secs == 0 {
            bail!("smtp.timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

/// Parse a configuration document
pub fn parse_config(content: &str) -> Result<MailConfig> {
    let config: MailConfig = toml::from_str(content).context("Failed to parse mail config")?;
    Ok(config.finalize())
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(String),
    /// Nothing at this path; built-in defaults are in effect
    Defaults(String),
}

/// Load configuration from an explicit path, $MAIL_TOOLS_CONFIG, or
/// /etc/mail-tools/config.toml. A missing file is only an error when the
/// path was given explicitly.
///
/// Nothing is logged here: this runs before the subscriber is installed,
/// so the caller reports the returned source.
pub fn load_config(explicit: Option<&str>) -> Result<(MailConfig, ConfigSource)> {
    let config_path = match explicit {
        Some(path) => path.to_string(),
        None => std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    };

    let (mut config, source) = read_config(&config_path, explicit.is_some())?;
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        config.smtp.password = password;
    }

    Ok((config.finalize(), source))
}

fn read_config(config_path: &str, required: bool) -> Result<(MailConfig, ConfigSource)> {
    if !Path::new(config_path).exists() {
        if required {
            bail!("Config file not found at {config_path}");
        }
        return Ok((MailConfig::default(), ConfigSource::Defaults(config_path.to_string())));
    }

    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read config from {config_path}"))?;
    let config = parse_config(&content).with_context(|| format!("Invalid config at {config_path}"))?;
    Ok((config, ConfigSource::File(config_path.to_string())))
}
