// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The per-container state machine.
//
// Sequencing is authoritative here: gateways are configured and activated in
// insertion order and torn down in reverse insertion order. An activation
// failure rolls back the already-activated gateways; teardown never aborts on
// a single failure.

use crate::domain::capability::CapabilityStore;
use crate::domain::container::{ContainerId, DynamicContainerOptions, LifecycleState};
use crate::domain::error::SupervisorError;
use crate::domain::events::ContainerEvent;
use crate::domain::gateway::{GatewayError, GatewayFactory, GatewayState, ManagedGateway};
use crate::domain::runtime::ContainerRuntime;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Convert a gateway failure into the agent-level error surface, keeping the
/// network and proxy kinds distinguishable for the facade.
fn into_supervisor_error(gateway: &str, err: GatewayError) -> SupervisorError {
    match err {
        GatewayError::BridgeMissing { device, address } => {
            SupervisorError::BridgeMissing { device, address }
        }
        GatewayError::NetworkSetup(reason) => SupervisorError::NetworkSetupFailure(reason),
        GatewayError::Proxy(reason) => SupervisorError::ProxyFailure(reason),
        other => SupervisorError::Gateway {
            gateway: gateway.to_string(),
            reason: other.to_string(),
        },
    }
}

pub struct ContainerLifecycle {
    id: ContainerId,
    name: String,
    state: LifecycleState,
    options: DynamicContainerOptions,
    runtime: Arc<dyn ContainerRuntime>,
    gateways: Vec<ManagedGateway>,
    capabilities: BTreeSet<String>,
    init_pid: Option<i32>,
    pids: Vec<i32>,
    events: EventBus,
}

impl ContainerLifecycle {
    pub fn new(
        id: ContainerId,
        name: String,
        options: DynamicContainerOptions,
        runtime: Arc<dyn ContainerRuntime>,
        events: EventBus,
    ) -> Self {
        Self {
            id,
            name,
            state: LifecycleState::Created,
            options,
            runtime,
            gateways: Vec::new(),
            capabilities: BTreeSet::new(),
            init_pid: None,
            pids: Vec::new(),
            events,
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn options(&self) -> &DynamicContainerOptions {
        &self.options
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities.iter().cloned().collect()
    }

    pub fn runtime(&self) -> Arc<dyn ContainerRuntime> {
        self.runtime.clone()
    }

    pub fn pids(&self) -> &[i32] {
        &self.pids
    }

    fn set_state(&mut self, to: LifecycleState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        debug!(container = %self.id, %from, %to, "state transition");
        self.events.publish(ContainerEvent::StateChanged {
            id: self.id,
            from,
            to,
            at: Utc::now(),
        });
    }

    fn require_state(
        &self,
        operation: &'static str,
        expected: &[LifecycleState],
    ) -> Result<(), SupervisorError> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(SupervisorError::State {
                operation,
                state: self.state,
            })
        }
    }

    /// Create and start the container with no user workload.
    pub async fn preload(&mut self) -> Result<(), SupervisorError> {
        self.require_state("preload", &[LifecycleState::Created])?;

        self.runtime.create().await?;
        let pid = self.runtime.start().await?;
        self.init_pid = Some(pid);

        self.set_state(LifecycleState::Preloaded);
        info!(container = %self.id, name = %self.name, init_pid = pid, "container preloaded");
        Ok(())
    }

    /// Apply the full desired capability set: resolve it, instantiate and
    /// configure the gateways it names, then activate everything in
    /// insertion order.
    ///
    /// Capabilities are a set, not a stack. Growing the set extends the
    /// running gateways with the additions; any removal tears the whole
    /// gateway set down and recomputes from scratch.
    pub async fn set_capabilities(
        &mut self,
        names: &[String],
        store: &CapabilityStore,
        factory: &dyn GatewayFactory,
    ) -> Result<(), SupervisorError> {
        self.require_state(
            "set capabilities on",
            &[LifecycleState::Preloaded, LifecycleState::Ready],
        )?;

        let previous = self.capabilities.clone();
        let desired: BTreeSet<String> = names.iter().cloned().collect();

        // Atomic: resolution fails before any gateway sees configuration.
        let config = store.resolve(desired.iter())?;

        let removing = self.capabilities.difference(&desired).next().is_some();
        if removing {
            let failed = self.teardown_gateways().await;
            if failed > 0 {
                warn!(
                    container = %self.id,
                    failed,
                    "teardown incomplete while recomputing capabilities"
                );
            }
            self.gateways.clear();
            // The old gateway set is gone; the container is back to its
            // preloaded shape until the recomputed set activates.
            self.set_state(LifecycleState::Preloaded);
        }
        self.capabilities = desired;

        for gateway_id in config.ids() {
            if self.gateways.iter().any(|gateway| gateway.id() == gateway_id) {
                continue;
            }
            match factory.create_gateway(&gateway_id, self.id, &self.name) {
                Some(gateway) => {
                    let mut managed = ManagedGateway::new(gateway);
                    managed.set_container(self.runtime.clone());
                    self.gateways.push(managed);
                }
                None => {
                    warn!(container = %self.id, gateway = %gateway_id, "skipping unknown gateway id");
                }
            }
        }

        let mut config_failure = None;
        for gateway in &mut self.gateways {
            // A gateway's configuration is frozen once it activated; when
            // the set only grows, already-activated gateways stay as they
            // are. A removal rebuilt the whole list above.
            if gateway.state() == GatewayState::Activated {
                continue;
            }
            let Some(fragments) = config.get(gateway.id()) else {
                continue;
            };
            if let Err(err) = gateway.set_config(&fragments) {
                error!(
                    container = %self.id,
                    gateway = gateway.id(),
                    error = %err,
                    "gateway rejected its configuration"
                );
                config_failure = Some((gateway.id().to_string(), err.to_string()));
                break;
            }
        }

        if let Some((gateway_id, reason)) = config_failure {
            // Nothing has been activated in this attempt; drop the fresh
            // instances so a retry starts from clean gateways instead of
            // re-accumulating fragments.
            self.gateways
                .retain(|gateway| gateway.state() == GatewayState::Activated);
            self.capabilities = previous;
            return Err(SupervisorError::Gateway {
                gateway: gateway_id,
                reason,
            });
        }

        if let Err(err) = self.activate_gateways().await {
            // Roll back: tear down whatever had activated, in reverse order.
            let failed = self.teardown_gateways().await;
            self.gateways.clear();
            self.capabilities = previous;
            if failed == 0 {
                self.set_state(LifecycleState::Preloaded);
            } else {
                error!(
                    container = %self.id,
                    failed,
                    "rollback teardown incomplete, destroying container"
                );
                let _ = self.runtime.destroy(Duration::from_secs(0)).await;
                self.set_state(LifecycleState::Terminated);
            }
            return Err(err);
        }

        self.set_state(LifecycleState::Ready);
        info!(
            container = %self.id,
            capabilities = ?self.capabilities,
            gateways = self.gateways.len(),
            "capabilities applied"
        );
        Ok(())
    }

    async fn activate_gateways(&mut self) -> Result<(), SupervisorError> {
        for gateway in &mut self.gateways {
            if gateway.state() == GatewayState::Activated {
                continue;
            }
            if !gateway.is_configured() {
                debug!(gateway = gateway.id(), "skipping unconfigured gateway");
                continue;
            }
            if let Err(err) = gateway.activate().await {
                error!(gateway = gateway.id(), error = %err, "gateway activation failed");
                return Err(into_supervisor_error(gateway.id(), err));
            }
        }
        Ok(())
    }

    /// Tear down every gateway in reverse insertion order. Failures are
    /// logged and counted, never short-circuited.
    async fn teardown_gateways(&mut self) -> usize {
        let mut failed = 0usize;
        for gateway in self.gateways.iter_mut().rev() {
            if let Err(err) = gateway.teardown().await {
                warn!(gateway = gateway.id(), error = %err, "gateway teardown failed");
                failed += 1;
            }
        }
        failed
    }

    /// Launch the user command inside the container.
    pub async fn execute(
        &mut self,
        command: &str,
        cwd: &Path,
        stdout_file: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<i32, SupervisorError> {
        self.require_state("execute in", &[LifecycleState::Ready])?;

        let pid = self.runtime.attach(command, env, cwd, stdout_file).await?;
        self.pids.push(pid);
        self.set_state(LifecycleState::Running);
        info!(container = %self.id, pid, command, "launched command");
        Ok(pid)
    }

    /// React to the exit of the user command: publish the process state
    /// change, then shut the container down.
    pub async fn handle_child_exit(&mut self, pid: i32, exit_code: i32) {
        if self.state.is_terminal() {
            debug!(container = %self.id, pid, "child exit after termination, ignoring");
            return;
        }

        self.events.publish(ContainerEvent::ProcessStateChanged {
            id: self.id,
            pid,
            is_running: false,
            exit_code,
            at: Utc::now(),
        });
        info!(container = %self.id, pid, exit_code, "child exited, shutting down");

        let timeout = Duration::from_secs(2);
        if let Err(err) = self.destroy(timeout).await {
            warn!(container = %self.id, error = %err, "shutdown after child exit was not clean");
        }
    }

    pub async fn suspend(&mut self) -> Result<(), SupervisorError> {
        self.require_state("suspend", &[LifecycleState::Running])?;
        self.runtime.suspend().await?;
        self.set_state(LifecycleState::Suspended);
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), SupervisorError> {
        self.require_state("resume", &[LifecycleState::Suspended])?;
        self.runtime.resume().await?;
        self.set_state(LifecycleState::Running);
        Ok(())
    }

    /// Bind-mount a host path into the container.
    pub async fn bind_mount(
        &mut self,
        host_path: &Path,
        container_path: &Path,
        readonly: bool,
    ) -> Result<(), SupervisorError> {
        if self.state.is_terminal() {
            return Err(SupervisorError::State {
                operation: "bind mount into",
                state: self.state,
            });
        }
        self.runtime
            .bind_mount(host_path, container_path, readonly)
            .await?;
        Ok(())
    }

    /// Tear down gateways in reverse order, then destroy the runtime. The
    /// container reaches the terminated state even when steps fail; the
    /// first failure is reported.
    pub async fn destroy(&mut self, timeout: Duration) -> Result<(), SupervisorError> {
        if self.state.is_terminal() {
            return Err(SupervisorError::State {
                operation: "destroy",
                state: self.state,
            });
        }

        let failed = self.teardown_gateways().await;
        let teardown_result = if failed == 0 {
            Ok(())
        } else {
            warn!(container = %self.id, failed, "gateway teardown incomplete");
            Err(SupervisorError::GatewayTeardownIncomplete { failed })
        };

        let destroy_result = self.runtime.destroy(timeout).await;

        self.set_state(LifecycleState::Terminated);
        info!(container = %self.id, "container terminated");

        destroy_result?;
        teardown_result
    }
}
