// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// The agent's registry of live containers and the typed call surface the IPC
// facade dispatches into.
//
// Operations on one container are serialized through its mutex; the registry
// itself is only held long enough to look the container up, so a blocking
// operation on one container never stalls requests for another.

use crate::application::lifecycle::ContainerLifecycle;
use crate::domain::agent_config::AgentConfig;
use crate::domain::capability::CapabilityStore;
use crate::domain::container::{ContainerId, LifecycleState};
use crate::domain::error::SupervisorError;
use crate::domain::gateway::GatewayFactory;
use crate::domain::options::parse_container_options;
use crate::domain::runtime::RuntimeFactory;
use crate::infrastructure::event_bus::EventBus;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

type SharedLifecycle = Arc<Mutex<ContainerLifecycle>>;

pub struct AgentCore {
    config: Arc<AgentConfig>,
    store: CapabilityStore,
    runtime_factory: Arc<dyn RuntimeFactory>,
    gateway_factory: Arc<dyn GatewayFactory>,
    containers: Arc<DashMap<ContainerId, SharedLifecycle>>,
    next_id: AtomicI32,
    events: EventBus,
}

impl AgentCore {
    pub fn new(
        config: Arc<AgentConfig>,
        store: CapabilityStore,
        runtime_factory: Arc<dyn RuntimeFactory>,
        gateway_factory: Arc<dyn GatewayFactory>,
    ) -> Self {
        Self {
            config,
            store,
            runtime_factory,
            gateway_factory,
            containers: Arc::new(DashMap::new()),
            next_id: AtomicI32::new(1),
            events: EventBus::with_default_capacity(),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ids of all live containers, ascending.
    pub fn list(&self) -> Vec<ContainerId> {
        let mut ids: Vec<ContainerId> = self.containers.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    /// Names of all known capabilities.
    pub fn list_capabilities(&self) -> Vec<String> {
        self.store.names()
    }

    /// Current lifecycle state of a container.
    pub async fn state(&self, id: ContainerId) -> Result<LifecycleState, SupervisorError> {
        let container = self.container(id)?;
        let guard = container.lock().await;
        Ok(guard.state())
    }

    /// Create a container from the request's options document and preload it.
    pub async fn create(&self, config_json: &str) -> Result<ContainerId, SupervisorError> {
        let options = parse_container_options(config_json)?;

        let id = ContainerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let name = format!("vessel-{id}");
        let runtime = self.runtime_factory.create_runtime(id, &name, &options)?;

        let mut lifecycle =
            ContainerLifecycle::new(id, name, options, runtime, self.events.clone());

        if let Err(err) = lifecycle.preload().await {
            error!(container = %id, error = %err, "preload failed, cleaning up");
            if let Err(cleanup_err) = lifecycle.destroy(self.config.shutdown_timeout()).await {
                warn!(container = %id, error = %cleanup_err, "cleanup after failed preload");
            }
            return Err(err);
        }

        self.containers.insert(id, Arc::new(Mutex::new(lifecycle)));
        info!(container = %id, "container created");
        Ok(id)
    }

    /// Apply the full desired capability set to the container. Additions
    /// extend the running gateways; removals recompute from scratch.
    pub async fn set_capabilities(
        &self,
        id: ContainerId,
        names: &[String],
    ) -> Result<(), SupervisorError> {
        let container = self.container(id)?;
        let mut guard = container.lock().await;
        let result = guard
            .set_capabilities(names, &self.store, self.gateway_factory.as_ref())
            .await;

        if guard.state().is_terminal() {
            drop(guard);
            self.containers.remove(&id);
        }
        result
    }

    /// Launch a command in the container and observe its exit.
    pub async fn execute(
        &self,
        id: ContainerId,
        command: &str,
        cwd: &Path,
        stdout_file: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<i32, SupervisorError> {
        let container = self.container(id)?;

        let (pid, runtime) = {
            let mut guard = container.lock().await;
            let pid = guard.execute(command, cwd, stdout_file, env).await?;
            (pid, guard.runtime())
        };

        // The exit observer runs outside the container lock so the lifecycle
        // stays operable while the command runs.
        let containers = Arc::clone(&self.containers);
        let lifecycle = Arc::clone(&container);
        tokio::spawn(async move {
            let exit_code = match runtime.wait(pid).await {
                Ok(code) => code,
                Err(err) => {
                    warn!(container = %id, pid, error = %err, "failed to observe child exit");
                    -1
                }
            };

            let mut guard = lifecycle.lock().await;
            guard.handle_child_exit(pid, exit_code).await;
            drop(guard);
            containers.remove(&id);
        });

        Ok(pid)
    }

    pub async fn suspend(&self, id: ContainerId) -> Result<(), SupervisorError> {
        let container = self.container(id)?;
        let mut guard = container.lock().await;
        guard.suspend().await
    }

    pub async fn resume(&self, id: ContainerId) -> Result<(), SupervisorError> {
        let container = self.container(id)?;
        let mut guard = container.lock().await;
        guard.resume().await
    }

    /// Bind-mount a host path into a container.
    pub async fn bind_mount(
        &self,
        id: ContainerId,
        host_path: &Path,
        container_path: &Path,
        readonly: bool,
    ) -> Result<(), SupervisorError> {
        let container = self.container(id)?;
        let mut guard = container.lock().await;
        guard.bind_mount(host_path, container_path, readonly).await
    }

    /// Tear down a container's gateways and destroy it.
    pub async fn destroy(&self, id: ContainerId) -> Result<(), SupervisorError> {
        let container = self.container(id)?;
        let result = {
            let mut guard = container.lock().await;
            guard.destroy(self.config.shutdown_timeout()).await
        };
        self.containers.remove(&id);
        result
    }

    /// Destroy every live container. Called on agent shutdown; no container
    /// survives an agent restart.
    pub async fn shutdown(&self) {
        let ids = self.list();
        for id in ids {
            if let Err(err) = self.destroy(id).await {
                warn!(container = %id, error = %err, "shutdown destroy was not clean");
            }
        }
    }

    fn container(&self, id: ContainerId) -> Result<SharedLifecycle, SupervisorError> {
        self.containers
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(SupervisorError::NoSuchContainer(id))
    }
}
