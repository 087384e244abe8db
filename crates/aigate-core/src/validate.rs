//! Field limits for assistants, threads and runs. Lengths count characters.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::CoreError;

pub const MAX_NAME_CHARS: usize = 256;
pub const MAX_DESCRIPTION_CHARS: usize = 512;
pub const MAX_INSTRUCTIONS_CHARS: usize = 256_000;
pub const MAX_METADATA_KEY_CHARS: usize = 64;
pub const MAX_METADATA_VALUE_CHARS: usize = 512;
pub const MAX_TOOLS: usize = 128;

fn exceeds(value: &str, limit: usize) -> bool {
    value.chars().count() > limit
}

fn invalid(message: &str) -> CoreError {
    CoreError::Validation(message.to_string())
}

pub fn validate_name(name: Option<&str>) -> Result<(), CoreError> {
    match name {
        Some(name) if exceeds(name, MAX_NAME_CHARS) => Err(invalid("Name exceeds 256 characters")),
        _ => Ok(()),
    }
}

pub fn validate_description(description: Option<&str>) -> Result<(), CoreError> {
    match description {
        Some(description) if exceeds(description, MAX_DESCRIPTION_CHARS) => {
            Err(invalid("Description exceeds 512 characters"))
        }
        _ => Ok(()),
    }
}

pub fn validate_instructions(instructions: Option<&str>) -> Result<(), CoreError> {
    match instructions {
        Some(instructions) if exceeds(instructions, MAX_INSTRUCTIONS_CHARS) => {
            Err(invalid("Instructions exceed 256,000 characters"))
        }
        _ => Ok(()),
    }
}

/// String values are measured as-is; other JSON values by their serialized form.
pub fn validate_metadata(metadata: &BTreeMap<String, Value>) -> Result<(), CoreError> {
    for (key, value) in metadata {
        if exceeds(key, MAX_METADATA_KEY_CHARS) {
            return Err(invalid("Metadata key exceeds 64 characters"));
        }
        let too_long = match value {
            Value::String(text) => exceeds(text, MAX_METADATA_VALUE_CHARS),
            other => exceeds(&other.to_string(), MAX_METADATA_VALUE_CHARS),
        };
        if too_long {
            return Err(invalid("Metadata value exceeds 512 characters"));
        }
    }
    Ok(())
}

pub fn validate_tool_count(count: usize) -> Result<(), CoreError> {
    if count > MAX_TOOLS {
        return Err(invalid("Too many tools - maximum 128 allowed"));
    }
    Ok(())
}
