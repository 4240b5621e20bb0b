// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The capability store maps capability names to bundles of gateway
// configuration fragments. It is loaded once at agent start from a host-side
// JSON file shaped as:
//
//   { "<capability>": [ { "id": "<gateway-id>", "config": [ ... ] }, ... ] }
//
// Resolution is atomic: if any requested name is unknown, no configuration is
// produced at all.

use crate::domain::error::SupervisorError;
use crate::domain::gateway_config::GatewayConfiguration;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One gateway-id/fragment-list pair inside a capability bundle.
#[derive(Debug, Clone)]
pub struct CapabilityEntry {
    pub gateway_id: String,
    pub config: Value,
}

/// All capabilities known to the agent.
#[derive(Debug, Default)]
pub struct CapabilityStore {
    capabilities: HashMap<String, Vec<CapabilityEntry>>,
}

impl CapabilityStore {
    /// Load the store from the well-known host path.
    pub fn load(path: &Path) -> Result<Self, SupervisorError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            SupervisorError::InvalidConfig(format!(
                "capabilities file {} is unreadable: {err}",
                path.display()
            ))
        })?;
        let store = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            capabilities = store.capabilities.len(),
            "loaded capability store"
        );
        Ok(store)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, SupervisorError> {
        let root: Value = serde_json::from_str(contents).map_err(|err| {
            SupervisorError::InvalidConfig(format!("capabilities file is not valid JSON: {err}"))
        })?;

        let object = root.as_object().ok_or_else(|| {
            SupervisorError::InvalidConfig("capabilities root is not an object".to_string())
        })?;

        let mut capabilities = HashMap::new();
        for (name, bundle) in object {
            let entries = bundle.as_array().ok_or_else(|| {
                SupervisorError::InvalidConfig(format!("capability '{name}' is not an array"))
            })?;

            let mut parsed = Vec::with_capacity(entries.len());
            for entry in entries {
                parsed.push(parse_entry(name, entry)?);
            }
            capabilities.insert(name.clone(), parsed);
        }

        Ok(Self { capabilities })
    }

    /// Names of all known capabilities, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.capabilities.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Expand a set of capability names into a gateway configuration.
    ///
    /// Rejects unknown names before touching the output, so a failed resolve
    /// never yields a partially applied configuration.
    pub fn resolve<S: AsRef<str>>(
        &self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<GatewayConfiguration, SupervisorError> {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();

        for name in &names {
            if !self.capabilities.contains_key(name) {
                return Err(SupervisorError::UnknownCapability(name.clone()));
            }
        }

        let mut config = GatewayConfiguration::new();
        for name in &names {
            for entry in &self.capabilities[name] {
                config
                    .append_array(&entry.gateway_id, &entry.config)
                    .map_err(|err| SupervisorError::InvalidConfig(err.to_string()))?;
            }
        }
        Ok(config)
    }
}

fn parse_entry(capability: &str, entry: &Value) -> Result<CapabilityEntry, SupervisorError> {
    let object = entry.as_object().ok_or_else(|| {
        SupervisorError::InvalidConfig(format!(
            "capability '{capability}' contains a non-object entry"
        ))
    })?;

    let gateway_id = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            SupervisorError::InvalidConfig(format!(
                "capability '{capability}' entry is missing a string 'id'"
            ))
        })?
        .to_string();

    let config = object.get("config").cloned().ok_or_else(|| {
        SupervisorError::InvalidConfig(format!(
            "capability '{capability}' entry is missing 'config'"
        ))
    })?;

    if !config.is_array() {
        return Err(SupervisorError::InvalidConfig(format!(
            "capability '{capability}' entry for gateway '{gateway_id}' has a non-array 'config'"
        )));
    }

    Ok(CapabilityEntry { gateway_id, config })
}
