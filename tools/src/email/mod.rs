//! Email tools — compose and send emails via SMTP.

pub mod attachments;
pub mod body;
pub mod compose;
pub mod request;
pub mod send;
pub mod transport;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;

use crate::schema;
use request::SendRequest;
use send::{Mailer, SendResult};

pub const TOOL_NAME: &str = "email.send";

/// Self-description handed to the agent framework
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub namespace: String,
    pub version: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub risk_level: String,
    pub requires_confirmation: bool,
    pub idempotent: bool,
    pub timeout_ms: u64,
}

/// Rendered result: `output` on success, `error` on failure, plus the
/// structured outcome
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: SendResult,
}

impl From<SendResult> for ToolResult {
    fn from(result: SendResult) -> Self {
        let text = result.to_string();
        if result.is_success() {
            Self {
                output: Some(text),
                error: None,
                result,
            }
        } else {
            Self {
                output: None,
                error: Some(text),
                result,
            }
        }
    }
}

/// JSON Schema of the tool input
pub fn input_schema() -> serde_json::Value {
    let address_list = json!({
        "anyOf": [
            { "type": "string" },
            { "type": "array", "items": { "type": "string" } }
        ]
    });
    json!({
        "type": "object",
        "properties": {
            "recipient": {
                "description": "Recipient addresses: one string separated by ';' or a list",
                "anyOf": address_list["anyOf"].clone()
            },
            "recipients": address_list.clone(),
            "subject": {
                "type": "string",
                "description": "Subject line, ideally no longer than 120 characters"
            },
            "content": {
                "type": "string",
                "description": "Body. Write {name} where the sender's name belongs; it is filled in automatically. Do not leave placeholders such as XXX."
            },
            "body": { "type": "string" },
            "is_html": {
                "type": "boolean",
                "description": "true (default) sends text/html, false sends text/plain"
            },
            "cc": {
                "description": "Optional CC addresses",
                "anyOf": address_list["anyOf"].clone()
            },
            "attachments": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Optional paths of files to attach"
            }
        },
        "required": ["subject"],
        "allOf": [
            { "anyOf": [ { "required": ["recipient"] }, { "required": ["recipients"] } ] },
            { "anyOf": [ { "required": ["content"] }, { "required": ["body"] } ] }
        ]
    })
}

pub struct EmailTool {
    mailer: Mailer,
    schema: serde_json::Value,
}

impl EmailTool {
    pub fn new(mailer: Mailer) -> Self {
        Self {
            mailer,
            schema: input_schema(),
        }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition {
            name: TOOL_NAME.to_string(),
            namespace: "email".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Send an email via SMTP to one or more recipients, with optional CC and file attachments. \
                          Separate multiple recipients with ';'. The body is HTML unless is_html is false."
                .to_string(),
            input_schema: input_schema(),
            risk_level: "medium".to_string(),
            requires_confirmation: false,
            idempotent: false,
            timeout_ms: 30000,
        }
    }

    /// Run the tool on raw JSON input.
    ///
    /// Send failures are reported inside the returned `ToolResult`; an `Err`
    /// only means the input could not be decoded.
    pub async fn execute(&self, input: &[u8]) -> Result<Vec<u8>> {
        let request: SendRequest =
            schema::decode(input, &self.schema).context("email.send: invalid input")?;
        let result = self.mailer.send(&request).await;
        schema::encode(&ToolResult::from(result)).context("email.send: failed to serialise output")
    }
}
