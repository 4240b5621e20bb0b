// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The D-Bus gateway filters the container's bus traffic through an external
// proxy process, one per bus. Config fragments carry the filter rules under
// `dbus-gateway-config-session` and `dbus-gateway-config-system`; missing
// keys are fine, a present key must be an array of rule objects forwarded
// verbatim to the proxy.

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use crate::infrastructure::dbus_proxy::{BusType, DBusProxySupervisor};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const SESSION_CONFIG: &str = "dbus-gateway-config-session";
pub const SYSTEM_CONFIG: &str = "dbus-gateway-config-system";

struct BusInstance {
    bus: BusType,
    supervisor: DBusProxySupervisor,
    rules: Vec<Value>,
    activated: bool,
}

impl BusInstance {
    fn new(bus: BusType, proxy_binary: &Path, gateway_dir: &Path, container_name: &str) -> Self {
        Self {
            bus,
            supervisor: DBusProxySupervisor::new(bus, proxy_binary, gateway_dir, container_name),
            rules: Vec::new(),
            activated: false,
        }
    }

    fn config_key(&self) -> &'static str {
        match self.bus {
            BusType::Session => SESSION_CONFIG,
            BusType::System => SYSTEM_CONFIG,
        }
    }

    fn is_configured(&self) -> bool {
        !self.rules.is_empty()
    }

    /// The configuration document fed to this bus's proxy: both top-level
    /// keys are present, the foreign bus's array stays empty.
    fn proxy_config(&self) -> Value {
        match self.bus {
            BusType::Session => json!({
                SESSION_CONFIG: self.rules,
                SYSTEM_CONFIG: [],
            }),
            BusType::System => json!({
                SESSION_CONFIG: [],
                SYSTEM_CONFIG: self.rules,
            }),
        }
    }

    async fn activate(&mut self, runtime: &Arc<dyn ContainerRuntime>) -> Result<(), GatewayError> {
        let variable = self.bus.address_variable();
        runtime
            .set_env(variable, &self.supervisor.container_address())
            .await
            .map_err(|err| GatewayError::Activation(err.to_string()))?;

        self.supervisor
            .start(&self.proxy_config())
            .await
            .map_err(|err| GatewayError::Proxy(err.to_string()))?;

        self.activated = true;
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        self.supervisor
            .stop()
            .await
            .map_err(|err| GatewayError::Teardown(err.to_string()))?;
        self.activated = false;
        Ok(())
    }
}

pub struct DBusGateway {
    session: BusInstance,
    system: BusInstance,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl DBusGateway {
    pub const ID: &'static str = "dbus";

    pub fn new(proxy_binary: &Path, gateway_dir: &Path, container_name: &str) -> Self {
        Self {
            session: BusInstance::new(
                BusType::Session,
                proxy_binary,
                gateway_dir,
                container_name,
            ),
            system: BusInstance::new(BusType::System, proxy_binary, gateway_dir, container_name),
            runtime: None,
        }
    }

    /// Extract the rule array for one bus from a config fragment. A missing
    /// key is not an error; a present key must be an array of objects.
    fn parse_bus_config(fragment: &Value, key: &str) -> Result<Option<Vec<Value>>, GatewayError> {
        let object = fragment.as_object().ok_or_else(|| {
            GatewayError::Config("d-bus gateway element is not an object".to_string())
        })?;

        let Some(bus_config) = object.get(key) else {
            debug!(key, "key not present in this fragment");
            return Ok(None);
        };

        let entries = bus_config
            .as_array()
            .ok_or_else(|| GatewayError::Config(format!("value for {key} is not an array")))?;

        for entry in entries {
            if !entry.is_object() {
                return Err(GatewayError::Config(format!(
                    "{key} array element is not an object"
                )));
            }
        }

        Ok(Some(entries.clone()))
    }
}

#[async_trait]
impl Gateway for DBusGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        // Validate everything before committing anything.
        let mut session_rules = Vec::new();
        let mut system_rules = Vec::new();
        for fragment in fragments {
            if let Some(rules) = Self::parse_bus_config(fragment, SESSION_CONFIG)? {
                session_rules.extend(rules);
            }
            if let Some(rules) = Self::parse_bus_config(fragment, SYSTEM_CONFIG)? {
                system_rules.extend(rules);
            }
        }

        if session_rules.is_empty() && system_rules.is_empty() {
            error!("neither session nor system bus could use the given config");
            return Err(GatewayError::Config(
                "no session or system bus configuration present".to_string(),
            ));
        }

        self.session.rules.extend(session_rules);
        self.system.rules.extend(system_rules);
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.session.is_configured() || self.system.is_configured()
    }

    /// Activation succeeds when at least one configured bus came up.
    async fn activate(&mut self) -> Result<(), GatewayError> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        let mut activated = 0usize;
        let mut last_error = None;

        for instance in [&mut self.session, &mut self.system] {
            if !instance.is_configured() {
                continue;
            }
            debug!(bus = instance.bus.mode_argument(), "activating d-bus proxy");
            match instance.activate(&runtime).await {
                Ok(()) => activated += 1,
                Err(err) => {
                    error!(bus = instance.bus.mode_argument(), error = %err, "bus activation failed");
                    last_error = Some(err);
                }
            }
        }

        if activated == 0 {
            return Err(last_error.unwrap_or_else(|| {
                GatewayError::Activation("no bus was configured".to_string())
            }));
        }
        Ok(())
    }

    /// Teardown succeeds only when every activated bus went down cleanly.
    async fn teardown(&mut self) -> Result<(), GatewayError> {
        let mut first_failure = None;

        for instance in [&mut self.session, &mut self.system] {
            if !instance.activated {
                warn!(
                    bus = instance.bus.mode_argument(),
                    "skipping teardown of never-activated bus"
                );
                continue;
            }
            if let Err(err) = instance.teardown().await {
                error!(bus = instance.bus.mode_argument(), error = %err, "bus teardown failed");
                first_failure.get_or_insert(err);
            }
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
