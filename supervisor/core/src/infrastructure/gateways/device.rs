// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// One character device to create inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub name: String,
    pub major: String,
    pub minor: String,
    pub mode: String,
}

/// Creates device nodes inside the container.
///
/// Config is `{ "devices": [ { "name", "major", "minor", "mode" } ] }` with
/// all four fields required strings. Activation issues `mknod` and `chmod`
/// through the runtime.
pub struct DeviceNodeGateway {
    devices: Vec<DeviceNode>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl DeviceNodeGateway {
    pub const ID: &'static str = "devicenode";

    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            runtime: None,
        }
    }

    fn parse_element(element: &Value) -> Result<Vec<DeviceNode>, GatewayError> {
        let object = element.as_object().ok_or_else(|| {
            GatewayError::Config("device node element is not an object".to_string())
        })?;

        let devices = object
            .get("devices")
            .ok_or_else(|| GatewayError::Config("'devices' key is missing".to_string()))?
            .as_array()
            .ok_or_else(|| GatewayError::Config("'devices' is not an array".to_string()))?;

        let mut parsed = Vec::with_capacity(devices.len());
        for device in devices {
            parsed.push(Self::parse_device(device)?);
        }
        Ok(parsed)
    }

    fn parse_device(device: &Value) -> Result<DeviceNode, GatewayError> {
        let object = device
            .as_object()
            .ok_or_else(|| GatewayError::Config("device entry is not an object".to_string()))?;

        let field = |key: &str| -> Result<String, GatewayError> {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    GatewayError::Config(format!("device entry is missing string '{key}'"))
                })
        };

        let name = field("name")?;
        let major = field("major")?;
        let minor = field("minor")?;
        let mode = field("mode")?;

        if major.parse::<u32>().is_err() {
            return Err(GatewayError::Config(format!(
                "device major '{major}' is not a number"
            )));
        }
        if minor.parse::<u32>().is_err() {
            return Err(GatewayError::Config(format!(
                "device minor '{minor}' is not a number"
            )));
        }
        if mode.is_empty() || mode.len() > 4 || !mode.bytes().all(|b| (b'0'..=b'7').contains(&b)) {
            return Err(GatewayError::Config(format!(
                "device mode '{mode}' is not an octal mode"
            )));
        }

        Ok(DeviceNode {
            name,
            major,
            minor,
            mode,
        })
    }
}

impl Default for DeviceNodeGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for DeviceNodeGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        let mut staged = Vec::new();
        for fragment in fragments {
            staged.extend(Self::parse_element(fragment)?);
        }

        if staged.is_empty() {
            return Err(GatewayError::Config(
                "device node gateway configuration names no devices".to_string(),
            ));
        }

        self.devices.extend(staged);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.devices.is_empty()
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        for device in &self.devices {
            let mknod = format!(
                "mknod {} c {} {}",
                device.name, device.major, device.minor
            );
            super::run_in_container(&runtime, &mknod).await?;

            let chmod = format!("chmod {} {}", device.mode, device.name);
            super::run_in_container(&runtime, &chmod).await?;

            debug!(device = %device.name, mode = %device.mode, "created device node");
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        // Device nodes live in the container filesystem and vanish with it.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_valid_device_list() {
        let mut gateway = DeviceNodeGateway::new();
        gateway
            .set_config(&[json!({
                "devices": [
                    { "name": "/dev/tty0", "major": "4", "minor": "0", "mode": "666" },
                    { "name": "/dev/galcore", "major": "199", "minor": "0", "mode": "766" }
                ]
            })])
            .unwrap();

        assert!(gateway.is_configured());
        assert_eq!(gateway.devices.len(), 2);
        assert_eq!(gateway.devices[0].name, "/dev/tty0");
        assert_eq!(gateway.devices[1].major, "199");
    }

    #[test]
    fn reject_wrong_top_level_key() {
        let mut gateway = DeviceNodeGateway::new();
        let result = gateway.set_config(&[json!({
            "wrongKey": [
                { "name": "tty0", "major": "4", "minor": "0", "mode": "666" }
            ]
        })]);
        assert!(result.is_err());
        assert!(!gateway.is_configured());
    }

    #[test]
    fn reject_missing_fields() {
        let mut gateway = DeviceNodeGateway::new();
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "major": "4", "minor": "0", "mode": "666" }]
            })])
            .is_err());
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "mode": "666" }]
            })])
            .is_err());
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "name": "tty0", "major": "4", "minor": "0" }]
            })])
            .is_err());
    }

    #[test]
    fn reject_malformed_values() {
        let mut gateway = DeviceNodeGateway::new();
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "name": "tty0", "major": "four", "minor": "0", "mode": "666" }]
            })])
            .is_err());
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "name": "tty0", "major": "4", "minor": "0", "mode": "888" }]
            })])
            .is_err());
        assert!(gateway
            .set_config(&[json!({
                "devices": [{ "name": "tty0", "major": "4", "minor": "0", "mode": "66666" }]
            })])
            .is_err());
    }

    #[test]
    fn configs_accumulate() {
        let mut gateway = DeviceNodeGateway::new();
        gateway
            .set_config(&[json!({
                "devices": [{ "name": "/dev/tty0", "major": "4", "minor": "0", "mode": "666" }]
            })])
            .unwrap();
        gateway
            .set_config(&[json!({
                "devices": [{ "name": "/dev/fuse", "major": "10", "minor": "229", "mode": "600" }]
            })])
            .unwrap();

        assert_eq!(gateway.devices.len(), 2);
    }
}
