// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::container::ContainerId;
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Directory inside the container under which gateway sockets are exposed.
pub const GATEWAY_DIR_IN_CONTAINER: &str = "/gateways";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    Config(String),
    #[error("gateway activation failed: {0}")]
    Activation(String),
    #[error("gateway teardown failed: {0}")]
    Teardown(String),
    #[error("host bridge '{device}' is not available at {address}")]
    BridgeMissing { device: String, address: String },
    #[error("network setup failed: {0}")]
    NetworkSetup(String),
    #[error("d-bus proxy failure: {0}")]
    Proxy(String),
}

/// The contract every gateway implements.
///
/// A gateway mediates one class of host/container interaction. Configuration
/// fragments accumulate over successive `set_config` calls; a failed call
/// must leave no observable trace. Activation applies the accumulated
/// configuration, producing side effects such as mounts, subprocesses or
/// firewall rules. Teardown reverses them and must release every externally
/// visible resource even when individual steps fail.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Stable identifier used as the key in a `GatewayConfiguration`.
    fn id(&self) -> &'static str;

    /// Provide the runtime handle used for bind-mounts, environment exports
    /// and symlink creation inside the container.
    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>);

    /// Parse and validate configuration fragments, accumulating them with any
    /// previously applied ones.
    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError>;

    /// True once at least one `set_config` call succeeded.
    fn is_configured(&self) -> bool;

    async fn activate(&mut self) -> Result<(), GatewayError>;

    async fn teardown(&mut self) -> Result<(), GatewayError>;
}

/// Per-gateway lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    Created,
    Configured,
    Activated,
    TornDown,
}

/// A gateway plus its position in the state machine
/// `Created -> Configured -> Activated -> TornDown`.
///
/// The wrapper enforces the transition rules so that individual gateways only
/// have to implement their own semantics.
pub struct ManagedGateway {
    state: GatewayState,
    inner: Box<dyn Gateway>,
}

impl ManagedGateway {
    pub fn new(inner: Box<dyn Gateway>) -> Self {
        Self {
            state: GatewayState::Created,
            inner,
        }
    }

    pub fn id(&self) -> &'static str {
        self.inner.id()
    }

    pub fn state(&self) -> GatewayState {
        self.state
    }

    pub fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.inner.set_container(runtime);
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_configured()
    }

    /// Apply configuration fragments. Allowed before activation; repeated
    /// calls accumulate. A failed call leaves the state untouched.
    pub fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        match self.state {
            GatewayState::Created | GatewayState::Configured => {
                self.inner.set_config(fragments)?;
                self.state = GatewayState::Configured;
                Ok(())
            }
            state => Err(GatewayError::Config(format!(
                "cannot configure gateway '{}' in state {state:?}",
                self.inner.id()
            ))),
        }
    }

    /// Activate the gateway. Calling activate on a never-configured gateway
    /// is a framework error: the gateway is forced into torn-down with no
    /// side effects.
    pub async fn activate(&mut self) -> Result<(), GatewayError> {
        match self.state {
            GatewayState::Configured => {
                self.inner.activate().await?;
                self.state = GatewayState::Activated;
                Ok(())
            }
            GatewayState::Created => {
                warn!(gateway = self.inner.id(), "activate called on unconfigured gateway");
                self.state = GatewayState::TornDown;
                Err(GatewayError::Activation(format!(
                    "gateway '{}' was never configured",
                    self.inner.id()
                )))
            }
            state => Err(GatewayError::Activation(format!(
                "cannot activate gateway '{}' in state {state:?}",
                self.inner.id()
            ))),
        }
    }

    /// Undo activation side effects. Safe to call on gateways that never
    /// activated; those report success with a warning.
    pub async fn teardown(&mut self) -> Result<(), GatewayError> {
        match self.state {
            GatewayState::Activated => {
                let result = self.inner.teardown().await;
                self.state = GatewayState::TornDown;
                result
            }
            GatewayState::TornDown => Ok(()),
            _ => {
                warn!(
                    gateway = self.inner.id(),
                    "tearing down gateway that was never activated"
                );
                self.state = GatewayState::TornDown;
                Ok(())
            }
        }
    }
}

/// Instantiates gateways by id for a given container.
pub trait GatewayFactory: Send + Sync {
    /// Returns `None` for unknown ids; the caller logs and skips those.
    fn create_gateway(
        &self,
        gateway_id: &str,
        container_id: ContainerId,
        container_name: &str,
    ) -> Option<Box<dyn Gateway>>;
}
