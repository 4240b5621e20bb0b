// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Writes cgroup settings for the container through the runtime.
///
/// Config elements are `{ "setting": "<cgroup file>", "value": "<value>" }`
/// and are applied in configuration order.
pub struct CgroupGateway {
    settings: Vec<(String, String)>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl CgroupGateway {
    pub const ID: &'static str = "cgroups";

    pub fn new() -> Self {
        Self {
            settings: Vec::new(),
            runtime: None,
        }
    }

    fn parse_element(element: &Value) -> Result<(String, String), GatewayError> {
        let object = element.as_object().ok_or_else(|| {
            GatewayError::Config("cgroup element is not an object".to_string())
        })?;

        let setting = object
            .get("setting")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::Config("'setting' key missing or of wrong type".to_string())
            })?
            .to_string();
        let value = object
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                GatewayError::Config("'value' key missing or of wrong type".to_string())
            })?
            .to_string();

        Ok((setting, value))
    }
}

impl Default for CgroupGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for CgroupGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        let mut staged = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            staged.push(Self::parse_element(fragment)?);
        }

        if staged.is_empty() {
            return Err(GatewayError::Config(
                "cgroup gateway configuration is empty".to_string(),
            ));
        }

        self.settings.extend(staged);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.settings.is_empty()
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        for (setting, value) in &self.settings {
            runtime
                .set_cgroup_item(setting, value)
                .await
                .map_err(|err| GatewayError::Activation(err.to_string()))?;
            debug!(setting = %setting, value = %value, "applied cgroup setting");
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        // Cgroup settings are scoped to the container and disappear with it.
        Ok(())
    }
}
