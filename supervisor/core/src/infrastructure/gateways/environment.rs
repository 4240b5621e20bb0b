// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Sets environment variables inside the container.
///
/// Config elements are `{name, value}` or `{name, value, append: true}`.
/// Defining the same variable twice is an error unless the second element
/// appends; appended values are joined with `:`.
pub struct EnvironmentGateway {
    variables: Vec<(String, String)>,
    configured: bool,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl EnvironmentGateway {
    pub const ID: &'static str = "env";

    pub fn new() -> Self {
        Self {
            variables: Vec::new(),
            configured: false,
            runtime: None,
        }
    }

    fn apply_element(
        variables: &mut Vec<(String, String)>,
        element: &Value,
    ) -> Result<(), GatewayError> {
        let object = element.as_object().ok_or_else(|| {
            GatewayError::Config("environment element is not an object".to_string())
        })?;

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Config("'name' key missing or of wrong type".to_string()))?
            .to_string();
        let value = object
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Config("'value' key missing or of wrong type".to_string()))?
            .to_string();

        let append = match object.get("append") {
            None => false,
            Some(Value::Bool(append)) => *append,
            Some(_) => {
                return Err(GatewayError::Config(
                    "'append' key is of wrong type".to_string(),
                ))
            }
        };

        match variables.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing_value)) => {
                if !append {
                    return Err(GatewayError::Config(format!(
                        "environment variable '{name}' is already defined"
                    )));
                }
                existing_value.push(':');
                existing_value.push_str(&value);
            }
            None => variables.push((name, value)),
        }
        Ok(())
    }

    #[cfg(test)]
    fn value_of(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }
}

impl Default for EnvironmentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for EnvironmentGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        let mut staged = self.variables.clone();
        for fragment in fragments {
            Self::apply_element(&mut staged, fragment)?;
        }

        if staged.is_empty() {
            return Err(GatewayError::Config(
                "environment gateway configuration is empty".to_string(),
            ));
        }

        self.variables = staged;
        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        for (name, value) in &self.variables {
            runtime
                .set_env(name, value)
                .await
                .map_err(|err| GatewayError::Activation(err.to_string()))?;
            debug!(name = %name, "exported environment variable");
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
}
