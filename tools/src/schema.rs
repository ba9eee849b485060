//! JSON Schema validation and (de)serialization of tool payloads

use anyhow::{anyhow, bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Check a parsed input against a schema, reporting every violation
pub fn validate_input(input: &Value, schema: &Value) -> Result<()> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| anyhow!("Invalid JSON schema: {e}"))?;

    let errors: Vec<String> = validator
        .iter_errors(input)
        .map(|error| error.to_string())
        .collect();

    if !errors.is_empty() {
        bail!("Input validation failed: {}", errors.join("; "));
    }
    Ok(())
}

/// Parse raw input bytes, validate them, and decode into `T`
pub fn decode<T: DeserializeOwned>(input: &[u8], schema: &Value) -> Result<T> {
    let value: Value =
        serde_json::from_slice(input).map_err(|e| anyhow!("Invalid JSON input: {e}"))?;
    validate_input(&value, schema)?;
    serde_json::from_value(value).map_err(|e| anyhow!("Invalid input: {e}"))
}

/// Serialize output to JSON bytes
pub fn encode<T: Serialize>(output: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(output).map_err(|e| anyhow!("Failed to serialize output: {e}"))
}
