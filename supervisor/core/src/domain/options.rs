// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Parser for the per-container options document passed with a Create request.
//
// The wire format is a JSON array of option objects:
//
//   [{ "writeBufferEnabled": true,
//      "temporaryFileSystemWriteBufferEnabled": true,
//      "temporaryFileSystemSize": 104857600 }]
//
// The tmpfs keys are only consulted when the write buffer is enabled; unknown
// keys are warned about and ignored. The parser holds no state between calls.

use crate::domain::container::{DynamicContainerOptions, DEFAULT_TEMPORARY_FILESYSTEM_SIZE};
use crate::domain::error::SupervisorError;
use serde_json::Value;
use tracing::warn;

const WRITE_BUFFER_KEY: &str = "writeBufferEnabled";
const TMPFS_ENABLED_KEY: &str = "temporaryFileSystemWriteBufferEnabled";
const TMPFS_SIZE_KEY: &str = "temporaryFileSystemSize";

const KNOWN_KEYS: [&str; 3] = [WRITE_BUFFER_KEY, TMPFS_ENABLED_KEY, TMPFS_SIZE_KEY];

/// Parse the Create request's options document.
pub fn parse_container_options(config: &str) -> Result<DynamicContainerOptions, SupervisorError> {
    if config.is_empty() {
        return Err(SupervisorError::InvalidConfig("empty".to_string()));
    }

    let root: Value = serde_json::from_str(config)
        .map_err(|err| SupervisorError::InvalidConfig(format!("not valid JSON: {err}")))?;

    let elements = root
        .as_array()
        .ok_or_else(|| SupervisorError::InvalidConfig("root element is not an array".to_string()))?;

    let mut options = DynamicContainerOptions::default();
    for element in elements {
        read_config_element(element, &mut options)?;
    }

    Ok(options)
}

fn read_config_element(
    element: &Value,
    options: &mut DynamicContainerOptions,
) -> Result<(), SupervisorError> {
    let object = element
        .as_object()
        .ok_or_else(|| SupervisorError::InvalidConfig("config entry is not an object".to_string()))?;

    for key in object.keys() {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            warn!(key = %key, "ignoring unknown container option");
        }
    }

    options.write_buffer_enabled = required_bool(object, WRITE_BUFFER_KEY)?;

    if options.write_buffer_enabled {
        options.temporary_filesystem_write_buffer_enabled =
            optional_bool(object, TMPFS_ENABLED_KEY)?.unwrap_or(false);

        if options.temporary_filesystem_write_buffer_enabled {
            options.temporary_filesystem_size = optional_u64(object, TMPFS_SIZE_KEY)?
                .unwrap_or(DEFAULT_TEMPORARY_FILESYSTEM_SIZE);
        }
    }

    Ok(())
}

fn required_bool(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<bool, SupervisorError> {
    match object.get(key) {
        Some(Value::Bool(value)) => Ok(*value),
        Some(_) => Err(SupervisorError::InvalidConfig(format!(
            "'{key}' is not a boolean"
        ))),
        None => Err(SupervisorError::InvalidConfig(format!("missing:{key}"))),
    }
}

fn optional_bool(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, SupervisorError> {
    match object.get(key) {
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(SupervisorError::InvalidConfig(format!(
            "'{key}' is not a boolean"
        ))),
        None => Ok(None),
    }
}

fn optional_u64(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<u64>, SupervisorError> {
    match object.get(key) {
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| SupervisorError::InvalidConfig(format!("'{key}' is not an integer"))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(err: SupervisorError) -> String {
        match err {
            SupervisorError::InvalidConfig(detail) => detail,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn parse_minimal_options() {
        let options = parse_container_options(r#"[{"writeBufferEnabled": true}]"#).unwrap();
        assert!(options.write_buffer_enabled);
        assert!(!options.temporary_filesystem_write_buffer_enabled);
        assert_eq!(options.temporary_filesystem_size, 104857600);
    }

    #[test]
    fn parse_full_options() {
        let config = r#"[{
            "writeBufferEnabled": true,
            "temporaryFileSystemWriteBufferEnabled": true,
            "temporaryFileSystemSize": 4096
        }]"#;
        let options = parse_container_options(config).unwrap();
        assert!(options.write_buffer_enabled);
        assert!(options.temporary_filesystem_write_buffer_enabled);
        assert_eq!(options.temporary_filesystem_size, 4096);
    }

    #[test]
    fn tmpfs_size_defaults_when_enabled() {
        let config = r#"[{
            "writeBufferEnabled": true,
            "temporaryFileSystemWriteBufferEnabled": true
        }]"#;
        let options = parse_container_options(config).unwrap();
        assert_eq!(
            options.temporary_filesystem_size,
            DEFAULT_TEMPORARY_FILESYSTEM_SIZE
        );
    }

    #[test]
    fn tmpfs_keys_ignored_without_write_buffer() {
        let config = r#"[{
            "writeBufferEnabled": false,
            "temporaryFileSystemWriteBufferEnabled": true,
            "temporaryFileSystemSize": 4096
        }]"#;
        let options = parse_container_options(config).unwrap();
        assert!(!options.temporary_filesystem_write_buffer_enabled);
        assert_eq!(options.temporary_filesystem_size, 104857600);
    }

    #[test]
    fn reject_empty_input() {
        let err = parse_container_options("").unwrap_err();
        assert_eq!(detail(err), "empty");
    }

    #[test]
    fn reject_missing_required_key() {
        let err = parse_container_options(r#"[{"WRONG": true}]"#).unwrap_err();
        assert_eq!(detail(err), "missing:writeBufferEnabled");
    }

    #[test]
    fn reject_non_array_root() {
        let err = parse_container_options(r#"{"writeBufferEnabled": true}"#).unwrap_err();
        assert_eq!(detail(err), "root element is not an array");
    }

    #[test]
    fn reject_non_object_element() {
        let err = parse_container_options(r#"[true]"#).unwrap_err();
        assert_eq!(detail(err), "config entry is not an object");
    }

    #[test]
    fn reject_wrongly_typed_value() {
        let err = parse_container_options(r#"[{"writeBufferEnabled": "yes"}]"#).unwrap_err();
        assert_eq!(detail(err), "'writeBufferEnabled' is not a boolean");
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let config = r#"[{"writeBufferEnabled": true, "somethingElse": 1}]"#;
        let options = parse_container_options(config).unwrap();
        assert!(options.write_buffer_enabled);
    }
}
