//! mail-tools — run the email.send tool once
//!
//! Usage: mail-tools [--config PATH] [--schema] [REQUEST_JSON]
//!
//! The request is read from the argument or, when absent, from stdin. The
//! tool result is printed to stdout as JSON; logs go to stderr.

use anyhow::{bail, Context, Result};
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use mail_tools::config::{self, ConfigSource, LoggingConfig};
use mail_tools::email::{EmailTool, ToolResult};
use mail_tools::Mailer;

struct Args {
    config: Option<String>,
    schema: bool,
    request: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        schema: false,
        request: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                args.config = Some(iter.next().context("--config needs a path")?);
            }
            "--schema" => args.schema = true,
            "--help" | "-h" => {
                bail!("usage: mail-tools [--config PATH] [--schema] [REQUEST_JSON]");
            }
            _ if args.request.is_none() => args.request = Some(arg),
            _ => bail!("unexpected argument: {arg}"),
        }
    }
    Ok(args)
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true);

    let result = if logging.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {e}"))
}

async fn read_request(args: &Args) -> Result<Vec<u8>> {
    if let Some(request) = &args.request {
        return Ok(request.clone().into_bytes());
    }
    let mut input = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut input)
        .await
        .context("Failed to read request from stdin")?;
    Ok(input)
}

async fn run() -> Result<bool> {
    let args = parse_args()?;

    if args.schema {
        println!("{}", serde_json::to_string_pretty(&EmailTool::definition())?);
        return Ok(true);
    }

    let (config, source) = config::load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;
    match &source {
        ConfigSource::File(path) => info!("Loaded config from {path}"),
        ConfigSource::Defaults(path) => warn!("Config file not found at {path}, using defaults"),
    }
    config.validate()?;
    info!(
        "mail-tools v{} using {}:{} ({:?})",
        env!("CARGO_PKG_VERSION"),
        config.smtp.host,
        config.smtp.port,
        config.smtp.tls_mode()
    );

    let mailer = Mailer::new(&config).context("Invalid sender configuration")?;
    let tool = EmailTool::new(mailer);

    let input = read_request(&args).await?;
    let output = tool.execute(&input).await?;
    let rendered: serde_json::Value = serde_json::from_slice(&output)?;
    println!("{}", serde_json::to_string_pretty(&rendered)?);

    Ok(rendered
        .get("error")
        .map_or(true, |e| e.is_null()))
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            let failure = ToolResult {
                output: None,
                error: Some(format!("{e:#}")),
                result: mail_tools::SendResult::Failure {
                    kind: mail_tools::FailureKind::UnknownError,
                    detail: format!("{e:#}"),
                },
            };
            eprintln!("mail-tools: {e:#}");
            if let Ok(json) = serde_json::to_string_pretty(&failure) {
                println!("{json}");
            }
            ExitCode::from(2)
        }
    }
}
