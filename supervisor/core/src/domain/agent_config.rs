// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Agent Configuration Types
//
// Defines the host-side configuration for a VESSEL agent:
// - Agent behavior (shutdown timeout, gateway socket directory)
// - Host networking prerequisites (bridge device, gateway address)
// - D-Bus proxy binary location
// - Capability store location
// - Runtime backend settings (template, rootfs base)
//
// There is no hidden global configuration: one value is constructed at agent
// startup and passed into the core explicitly.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level agent configuration manifest.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub agent: AgentSection,

    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub dbus: DbusSection,

    #[serde(default)]
    pub capabilities: CapabilitiesSection,

    #[serde(default)]
    pub runtime: RuntimeSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSection {
    /// Seconds given to the runtime stop step during destroy.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,

    /// Host directory in which per-container gateway sockets are created.
    #[serde(default = "default_gateway_dir")]
    pub gateway_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    /// Name of the host bridge joining containers to the virtual LAN.
    #[serde(default = "default_bridge_device")]
    pub bridge_device: String,

    /// Address the bridge is expected to carry; also used as the containers'
    /// default gateway.
    #[serde(default = "default_bridge_gateway")]
    pub bridge_gateway: String,

    /// Prefix length for container interface addresses.
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbusSection {
    /// The external D-Bus filtering proxy binary.
    #[serde(default = "default_proxy_binary")]
    pub proxy_binary: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesSection {
    /// The capability store file.
    #[serde(default = "default_capabilities_file")]
    pub file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// LXC template used when creating containers.
    #[serde(default = "default_template")]
    pub template: String,

    /// Optional LXC configuration file passed at container creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lxc_config: Option<PathBuf>,

    /// Directory under which container root filesystems live.
    #[serde(default = "default_rootfs_base")]
    pub rootfs_base: PathBuf,
}

impl AgentConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults.
    ///
    /// An explicitly given path must load; absence of a discoverable config
    /// file falls back to built-in defaults.
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match cli_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading agent configuration");
                Self::from_yaml_file(&path).map_err(|err| {
                    anyhow::anyhow!("failed to load config at {}: {err}", path.display())
                })?
            }
            None => {
                let system_config = PathBuf::from("/etc/vessel/agent.yaml");
                if system_config.exists() {
                    tracing::info!(path = %system_config.display(), "loading agent configuration");
                    Self::from_yaml_file(&system_config)?
                } else {
                    tracing::warn!("no configuration file found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. Lets deployments retarget the
    /// host bridge without editing the manifest.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(device) = std::env::var("VESSEL_BRIDGE_DEVICE") {
            if !device.is_empty() {
                tracing::info!(device = %device, "environment override: VESSEL_BRIDGE_DEVICE");
                self.network.bridge_device = device;
            }
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network.bridge_device.is_empty() {
            anyhow::bail!("network.bridge_device cannot be empty");
        }

        if self.network.bridge_gateway.parse::<Ipv4Addr>().is_err() {
            anyhow::bail!(
                "network.bridge_gateway '{}' is not a valid IPv4 address",
                self.network.bridge_gateway
            );
        }

        if self.network.prefix_length == 0 || self.network.prefix_length > 30 {
            anyhow::bail!(
                "network.prefix_length {} is out of range (1-30)",
                self.network.prefix_length
            );
        }

        if self.dbus.proxy_binary.as_os_str().is_empty() {
            anyhow::bail!("dbus.proxy_binary cannot be empty");
        }

        if self.runtime.template.is_empty() {
            anyhow::bail!("runtime.template cannot be empty");
        }

        Ok(())
    }

    pub fn bridge_gateway_addr(&self) -> Ipv4Addr {
        self.network
            .bridge_gateway
            .parse()
            .unwrap_or(Ipv4Addr::new(10, 0, 3, 1))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.shutdown_timeout_seconds)
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            shutdown_timeout_seconds: default_shutdown_timeout(),
            gateway_dir: default_gateway_dir(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bridge_device: default_bridge_device(),
            bridge_gateway: default_bridge_gateway(),
            prefix_length: default_prefix_length(),
        }
    }
}

impl Default for DbusSection {
    fn default() -> Self {
        Self {
            proxy_binary: default_proxy_binary(),
        }
    }
}

impl Default for CapabilitiesSection {
    fn default() -> Self {
        Self {
            file: default_capabilities_file(),
        }
    }
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            template: default_template(),
            lxc_config: None,
            rootfs_base: default_rootfs_base(),
        }
    }
}

// Default value functions
fn default_shutdown_timeout() -> u64 {
    2
}

fn default_gateway_dir() -> PathBuf {
    PathBuf::from("/run/vessel/gateways")
}

fn default_bridge_device() -> String {
    "lxcbr0".to_string()
}

fn default_bridge_gateway() -> String {
    "10.0.3.1".to_string()
}

fn default_prefix_length() -> u8 {
    24
}

fn default_proxy_binary() -> PathBuf {
    PathBuf::from("dbus-proxy")
}

fn default_capabilities_file() -> PathBuf {
    PathBuf::from("/etc/vessel/capabilities.json")
}

fn default_template() -> String {
    "vessel".to_string()
}

fn default_rootfs_base() -> PathBuf {
    PathBuf::from("/var/lib/vessel")
}
