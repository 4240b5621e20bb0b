// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The network gateway joins the container to the host bridge: it verifies
// the bridge prerequisite, brings the container's interfaces up with a
// generated address, installs the configured iptables policy inside the
// container and sets the default route.

use crate::domain::agent_config::NetworkSection;
use crate::domain::container::ContainerId;
use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use crate::infrastructure::gateways::iptables::{self, IpTableEntry};
use crate::infrastructure::netlink::NetlinkHelper;
use async_trait::async_trait;
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct NetworkGateway {
    bridge_device: String,
    default_gateway: Ipv4Addr,
    prefix_length: u8,
    container_id: ContainerId,
    internet_access: bool,
    gateway_override: Option<Ipv4Addr>,
    entries: Vec<IpTableEntry>,
    configured: bool,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl NetworkGateway {
    pub const ID: &'static str = "network";

    pub fn new(settings: &NetworkSection, bridge_gateway: Ipv4Addr, container_id: ContainerId) -> Self {
        Self {
            bridge_device: settings.bridge_device.clone(),
            default_gateway: bridge_gateway,
            prefix_length: settings.prefix_length,
            container_id,
            internet_access: false,
            gateway_override: None,
            entries: Vec::new(),
            configured: false,
            runtime: None,
        }
    }

    fn gateway_address(&self) -> Ipv4Addr {
        self.gateway_override.unwrap_or(self.default_gateway)
    }

    fn parse_fragment(
        fragment: &Value,
    ) -> Result<(Option<bool>, Option<Ipv4Addr>, Vec<IpTableEntry>), GatewayError> {
        let object = fragment.as_object().ok_or_else(|| {
            GatewayError::Config("network gateway element is not an object".to_string())
        })?;

        let internet_access = match object.get("internet-access") {
            None => None,
            Some(Value::Bool(enabled)) => Some(*enabled),
            Some(_) => {
                return Err(GatewayError::Config(
                    "'internet-access' is not a boolean".to_string(),
                ))
            }
        };

        let gateway = match object.get("gateway") {
            None => None,
            Some(Value::String(address)) => Some(address.parse::<Ipv4Addr>().map_err(|_| {
                GatewayError::Config(format!("'{address}' is not a valid IPv4 address"))
            })?),
            Some(_) => {
                return Err(GatewayError::Config(
                    "'gateway' is not a string".to_string(),
                ))
            }
        };

        let mut entries = Vec::new();
        if let Some(rules) = object.get("rules") {
            let rules = rules
                .as_array()
                .ok_or_else(|| GatewayError::Config("'rules' is not an array".to_string()))?;
            for rule in rules {
                entries.push(iptables::parse_entry(rule)?);
            }
        }

        Ok((internet_access, gateway, entries))
    }
}

#[async_trait]
impl Gateway for NetworkGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        // Parse every fragment before mutating accumulated state.
        let mut parsed = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            parsed.push(Self::parse_fragment(fragment)?);
        }

        for (internet_access, gateway, entries) in parsed {
            if let Some(enabled) = internet_access {
                self.internet_access |= enabled;
            }
            if let Some(address) = gateway {
                // Later fragments win.
                self.gateway_override = Some(address);
            }
            self.entries.extend(entries);
        }

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

        let gateway_address = self.gateway_address();

        // Netlink syscalls are synchronous host operations; the lifecycle
        // task is allowed to block on them.
        let mut netlink =
            NetlinkHelper::new().map_err(|err| GatewayError::NetworkSetup(err.to_string()))?;
        netlink
            .dump()
            .map_err(|err| GatewayError::NetworkSetup(err.to_string()))?;

        let bridge_up = netlink
            .is_bridge_available(&self.bridge_device, gateway_address)
            .map_err(|err| GatewayError::NetworkSetup(err.to_string()))?;
        if !bridge_up {
            return Err(GatewayError::BridgeMissing {
                device: self.bridge_device.clone(),
                address: gateway_address.to_string(),
            });
        }

        let address = container_address(gateway_address, self.container_id);
        let links: Vec<i32> = netlink.links().iter().map(|link| link.index).collect();
        for index in links {
            netlink
                .up(index, address, self.prefix_length)
                .map_err(|err| GatewayError::NetworkSetup(err.to_string()))?;
        }
        info!(
            container = %self.container_id,
            address = %address,
            "brought container interfaces up"
        );

        for entry in &self.entries {
            for line in entry.command_lines() {
                debug!(rule = %line, "installing iptables rule");
                super::run_in_container(&runtime, &line).await?;
            }
        }

        if self.internet_access {
            netlink
                .set_default_gateway(gateway_address)
                .map_err(|err| GatewayError::NetworkSetup(err.to_string()))?;
        } else {
            debug!("internet access disabled, leaving the default route unset");
        }

        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        let mut netlink =
            NetlinkHelper::new().map_err(|err| GatewayError::Teardown(err.to_string()))?;
        netlink
            .dump()
            .map_err(|err| GatewayError::Teardown(err.to_string()))?;

        let mut first_failure = None;
        let interfaces = netlink.interfaces();
        for (index, name) in interfaces {
            if let Err(err) = netlink.down(index) {
                warn!(interface = %name, error = %err, "failed to bring interface down");
                first_failure.get_or_insert(GatewayError::Teardown(err.to_string()));
            }
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

/// Generate the container's interface address from the bridge subnet and the
/// container id: host suffixes run 2..=254 and wrap around.
pub fn container_address(gateway: Ipv4Addr, id: ContainerId) -> Ipv4Addr {
    let base = u32::from(gateway) & 0xffff_ff00;
    let suffix = 2 + ((id.as_i32() - 1).rem_euclid(253)) as u32;
    Ipv4Addr::from(base | suffix)
}
