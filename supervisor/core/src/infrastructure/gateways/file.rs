// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The file gateway exposes individual host files and directories inside the
// container via bind mounts. Settings with the same container path merge:
// the host path must match, and read-only is only kept when every setting
// asked for it.

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

/// One parsed file exposure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSetting {
    pub path_in_host: String,
    pub path_in_container: String,
    pub create_symlink_in_container: bool,
    pub read_only: bool,
    pub env_var_name: Option<String>,
    pub env_var_prefix: String,
    pub env_var_suffix: String,
}

/// Accumulates file settings, merging duplicates per container path.
#[derive(Debug, Clone, Default)]
pub struct FileSettingStore {
    settings: Vec<FileSetting>,
}

impl FileSettingStore {
    pub fn add(&mut self, setting: FileSetting) -> Result<(), GatewayError> {
        if let Some(existing) = self
            .settings
            .iter_mut()
            .find(|existing| existing.path_in_container == setting.path_in_container)
        {
            if existing.path_in_host != setting.path_in_host {
                error!(
                    container_path = %setting.path_in_container,
                    "two files with the same container path but different host paths"
                );
                return Err(GatewayError::Config(format!(
                    "container path '{}' is already mapped from '{}'",
                    setting.path_in_container, existing.path_in_host
                )));
            }
            // The most permissive mode wins.
            existing.read_only &= setting.read_only;
            return Ok(());
        }

        self.settings.push(setting);
        Ok(())
    }

    pub fn settings(&self) -> &[FileSetting] {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

pub struct FileGateway {
    store: FileSettingStore,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl FileGateway {
    pub const ID: &'static str = "file";

    pub fn new() -> Self {
        Self {
            store: FileSettingStore::default(),
            runtime: None,
        }
    }

    fn parse_setting(element: &Value) -> Result<FileSetting, GatewayError> {
        let object = element.as_object().ok_or_else(|| {
            GatewayError::Config("file gateway element is not an object".to_string())
        })?;

        let path_in_host = obligatory_string(object, "path-host")?;
        let path_in_container = obligatory_string(object, "path-container")?;

        if path_in_host.is_empty() {
            return Err(GatewayError::Config(
                "path-host setting is an empty string".to_string(),
            ));
        }
        if path_in_container.is_empty() {
            return Err(GatewayError::Config(
                "path-container setting is an empty string".to_string(),
            ));
        }

        let read_only = optional_bool(object, "read-only")?.unwrap_or(false);
        let create_symlink = optional_bool(object, "create-symlink")?.unwrap_or(false);

        let env_var_name = optional_string(object, "env-var-name")?;
        let env_var_prefix = optional_string(object, "env-var-prefix")?;
        let env_var_suffix = optional_string(object, "env-var-suffix")?;

        if env_var_name.is_none() && (env_var_prefix.is_some() || env_var_suffix.is_some()) {
            return Err(GatewayError::Config(
                "env-var-prefix/env-var-suffix require env-var-name".to_string(),
            ));
        }

        Ok(FileSetting {
            path_in_host,
            path_in_container,
            create_symlink_in_container: create_symlink,
            read_only,
            env_var_name,
            env_var_prefix: env_var_prefix.unwrap_or_default(),
            env_var_suffix: env_var_suffix.unwrap_or_default(),
        })
    }

    #[cfg(test)]
    pub fn store(&self) -> &FileSettingStore {
        &self.store
    }
}

impl Default for FileGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for FileGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        // Parse and merge into a scratch store first so a bad fragment
        // leaves the accumulated settings untouched.
        let mut staged = self.store.clone();
        for fragment in fragments {
            let setting = Self::parse_setting(fragment)?;
            staged.add(setting)?;
        }

        if staged.is_empty() {
            return Err(GatewayError::Config(
                "file gateway configuration is empty".to_string(),
            ));
        }

        self.store = staged;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        !self.store.is_empty()
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        for setting in self.store.settings() {
            let mounted = runtime
                .bind_mount(
                    Path::new(&setting.path_in_host),
                    Path::new(&setting.path_in_container),
                    setting.read_only,
                )
                .await
                .map_err(|err| GatewayError::Activation(err.to_string()))?;

            if let Some(name) = &setting.env_var_name {
                let value = format!(
                    "{}{}{}",
                    setting.env_var_prefix,
                    mounted.display(),
                    setting.env_var_suffix
                );
                runtime
                    .set_env(name, &value)
                    .await
                    .map_err(|err| GatewayError::Activation(err.to_string()))?;
            }

            if setting.create_symlink_in_container {
                runtime
                    .create_symlink(
                        Path::new(&setting.path_in_container),
                        Path::new(&setting.path_in_host),
                    )
                    .await
                    .map_err(|err| GatewayError::Activation(err.to_string()))?;
            }

            debug!(
                host = %setting.path_in_host,
                container = %setting.path_in_container,
                read_only = setting.read_only,
                "exposed file"
            );
        }

        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        // Bind mounts and symlinks live in the container filesystem and are
        // reclaimed when the runtime destroys it.
        Ok(())
    }
}

fn obligatory_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<String, GatewayError> {
    object
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::Config(format!("{key} key missing or of wrong type")))
}

fn optional_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>, GatewayError> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(GatewayError::Config(format!("{key} has wrong format"))),
    }
}

fn optional_bool(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<bool>, GatewayError> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(GatewayError::Config(format!("{key} has wrong format"))),
    }
}
