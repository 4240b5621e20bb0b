// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cgroup;
pub mod dbus;
pub mod device;
pub mod environment;
pub mod file;
pub mod iptables;
pub mod network;
pub mod pulse;

pub use cgroup::CgroupGateway;
pub use dbus::DBusGateway;
pub use device::DeviceNodeGateway;
pub use environment::EnvironmentGateway;
pub use file::FileGateway;
pub use network::NetworkGateway;
pub use pulse::PulseGateway;

use crate::domain::agent_config::AgentConfig;
use crate::domain::container::ContainerId;
use crate::domain::gateway::{Gateway, GatewayError, GatewayFactory};
use crate::domain::runtime::ContainerRuntime;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Run a setup command inside the container and require a clean exit.
///
/// `attach` only hands back a pid; the exit status is observed through
/// `wait`, so a failing command surfaces as an activation error instead of
/// silently succeeding.
pub(crate) async fn run_in_container(
    runtime: &Arc<dyn ContainerRuntime>,
    command: &str,
) -> Result<(), GatewayError> {
    let env = HashMap::new();
    let pid = runtime
        .attach(command, &env, Path::new("/"), None)
        .await
        .map_err(|err| GatewayError::Activation(err.to_string()))?;

    let exit_code = runtime
        .wait(pid)
        .await
        .map_err(|err| GatewayError::Activation(err.to_string()))?;
    if exit_code != 0 {
        return Err(GatewayError::Activation(format!(
            "'{command}' exited with status {exit_code}"
        )));
    }
    Ok(())
}

/// Instantiates the production gateways from the agent configuration.
pub struct DefaultGatewayFactory {
    config: Arc<AgentConfig>,
}

impl DefaultGatewayFactory {
    pub fn new(config: Arc<AgentConfig>) -> Self {
        Self { config }
    }
}

impl GatewayFactory for DefaultGatewayFactory {
    fn create_gateway(
        &self,
        gateway_id: &str,
        container_id: ContainerId,
        container_name: &str,
    ) -> Option<Box<dyn Gateway>> {
        match gateway_id {
            DBusGateway::ID => Some(Box::new(DBusGateway::new(
                &self.config.dbus.proxy_binary,
                &self.config.agent.gateway_dir,
                container_name,
            ))),
            FileGateway::ID => Some(Box::new(FileGateway::new())),
            NetworkGateway::ID => Some(Box::new(NetworkGateway::new(
                &self.config.network,
                self.config.bridge_gateway_addr(),
                container_id,
            ))),
            DeviceNodeGateway::ID => Some(Box::new(DeviceNodeGateway::new())),
            EnvironmentGateway::ID => Some(Box::new(EnvironmentGateway::new())),
            PulseGateway::ID => Some(Box::new(PulseGateway::new())),
            CgroupGateway::ID => Some(Box::new(CgroupGateway::new())),
            unknown => {
                warn!(gateway = unknown, "no gateway registered under this id");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_knows_every_gateway_id() {
        let factory = DefaultGatewayFactory::new(Arc::new(AgentConfig::default()));
        for id in [
            "dbus",
            "file",
            "network",
            "devicenode",
            "env",
            "pulseaudio",
            "cgroups",
        ] {
            let gateway = factory
                .create_gateway(id, ContainerId(1), "vessel-1")
                .unwrap_or_else(|| panic!("no gateway for id '{id}'"));
            assert_eq!(gateway.id(), id);
        }
    }

    #[test]
    fn unknown_ids_are_skipped() {
        let factory = DefaultGatewayFactory::new(Arc::new(AgentConfig::default()));
        assert!(factory
            .create_gateway("wayland", ContainerId(1), "vessel-1")
            .is_none());
    }
}
