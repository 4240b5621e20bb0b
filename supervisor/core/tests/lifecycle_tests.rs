// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lifecycle scenarios driven through a mock runtime and scripted gateways:
// the happy path from create to child exit, activation rollback, id
// allocation and post-destroy behavior.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use vessel_core::application::AgentCore;
use vessel_core::domain::agent_config::AgentConfig;
use vessel_core::domain::capability::CapabilityStore;
use vessel_core::domain::container::{ContainerId, DynamicContainerOptions, LifecycleState};
use vessel_core::domain::error::SupervisorError;
use vessel_core::domain::events::ContainerEvent;
use vessel_core::domain::gateway::{Gateway, GatewayError, GatewayFactory};
use vessel_core::domain::runtime::{ContainerRuntime, RuntimeError, RuntimeFactory};

/// Runtime double that records calls and lets tests script child exits.
struct MockRuntime {
    calls: Arc<StdMutex<Vec<String>>>,
    next_pid: AtomicI32,
    exit_code: Arc<StdMutex<Option<i32>>>,
    exit_signal: Arc<tokio::sync::Notify>,
}

impl MockRuntime {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Arc::new(StdMutex::new(Vec::new())),
            next_pid: AtomicI32::new(100),
            exit_code: Arc::new(StdMutex::new(None)),
            exit_signal: Arc::new(tokio::sync::Notify::new()),
        })
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Let every pending `wait` observe the given exit code.
    fn complete_child(&self, exit_code: i32) {
        *self.exit_code.lock().unwrap() = Some(exit_code);
        self.exit_signal.notify_waiters();
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create(&self) -> Result<(), RuntimeError> {
        self.record("create");
        Ok(())
    }

    async fn start(&self) -> Result<i32, RuntimeError> {
        self.record("start");
        Ok(1)
    }

    async fn attach(
        &self,
        command: &str,
        _env: &HashMap<String, String>,
        _cwd: &Path,
        _stdout_file: Option<&Path>,
    ) -> Result<i32, RuntimeError> {
        self.record(format!("attach:{command}"));
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    async fn wait(&self, _pid: i32) -> Result<i32, RuntimeError> {
        loop {
            if let Some(code) = *self.exit_code.lock().unwrap() {
                return Ok(code);
            }
            self.exit_signal.notified().await;
        }
    }

    async fn bind_mount(
        &self,
        host_path: &Path,
        container_path: &Path,
        readonly: bool,
    ) -> Result<PathBuf, RuntimeError> {
        self.record(format!(
            "bind_mount:{}:{}:{}",
            host_path.display(),
            container_path.display(),
            readonly
        ));
        Ok(container_path.to_path_buf())
    }

    async fn create_symlink(&self, _target: &Path, _link: &Path) -> Result<(), RuntimeError> {
        self.record("create_symlink");
        Ok(())
    }

    async fn set_env(&self, name: &str, _value: &str) -> Result<(), RuntimeError> {
        self.record(format!("set_env:{name}"));
        Ok(())
    }

    async fn set_cgroup_item(&self, setting: &str, value: &str) -> Result<(), RuntimeError> {
        self.record(format!("set_cgroup_item:{setting}={value}"));
        Ok(())
    }

    async fn suspend(&self) -> Result<(), RuntimeError> {
        self.record("suspend");
        Ok(())
    }

    async fn resume(&self) -> Result<(), RuntimeError> {
        self.record("resume");
        Ok(())
    }

    async fn destroy(&self, _timeout: Duration) -> Result<(), RuntimeError> {
        self.record("destroy");
        Ok(())
    }
}

struct MockRuntimeFactory {
    runtime: Arc<MockRuntime>,
}

impl RuntimeFactory for MockRuntimeFactory {
    fn create_runtime(
        &self,
        _id: ContainerId,
        _name: &str,
        _options: &DynamicContainerOptions,
    ) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
        Ok(self.runtime.clone())
    }
}

/// Gateway double whose activation outcome is scripted per id.
struct ScriptedGateway {
    name: &'static str,
    fail_activation: bool,
    configured: bool,
    log: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Gateway for ScriptedGateway {
    fn id(&self) -> &'static str {
        self.name
    }

    fn set_container(&mut self, _runtime: Arc<dyn ContainerRuntime>) {}

    fn set_config(&mut self, _fragments: &[Value]) -> Result<(), GatewayError> {
        self.configured = true;
        self.log.lock().unwrap().push(format!("config:{}", self.name));
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("activate:{}", self.name));
        if self.fail_activation {
            Err(GatewayError::Activation("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        self.log
            .lock()
            .unwrap()
            .push(format!("teardown:{}", self.name));
        Ok(())
    }
}

struct ScriptedGatewayFactory {
    failing: HashSet<&'static str>,
    log: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedGatewayFactory {
    fn new(failing: &[&'static str]) -> Self {
        Self {
            failing: failing.iter().copied().collect(),
            log: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl GatewayFactory for ScriptedGatewayFactory {
    fn create_gateway(
        &self,
        gateway_id: &str,
        _container_id: ContainerId,
        _container_name: &str,
    ) -> Option<Box<dyn Gateway>> {
        let name: &'static str = match gateway_id {
            "alpha" => "alpha",
            "beta" => "beta",
            _ => return None,
        };
        Some(Box::new(ScriptedGateway {
            name,
            fail_activation: self.failing.contains(name),
            configured: false,
            log: self.log.clone(),
        }))
    }
}

const CAPABILITIES: &str = r#"{
    "net": [
        { "id": "alpha", "config": [{}] },
        { "id": "beta", "config": [{}] }
    ],
    "audio": [
        { "id": "alpha", "config": [{}] }
    ]
}"#;

const MINIMAL_OPTIONS: &str = r#"[{"writeBufferEnabled": true}]"#;

struct Fixture {
    agent: AgentCore,
    runtime: Arc<MockRuntime>,
    gateways: Arc<ScriptedGatewayFactory>,
}

fn fixture(failing: &[&'static str]) -> Fixture {
    let runtime = MockRuntime::new();
    let gateways = Arc::new(ScriptedGatewayFactory::new(failing));
    let agent = AgentCore::new(
        Arc::new(AgentConfig::default()),
        CapabilityStore::from_json_str(CAPABILITIES).unwrap(),
        Arc::new(MockRuntimeFactory {
            runtime: runtime.clone(),
        }),
        gateways.clone(),
    );
    Fixture {
        agent,
        runtime,
        gateways,
    }
}

async fn wait_until_gone(agent: &AgentCore, id: ContainerId) {
    for _ in 0..200 {
        if !agent.list().contains(&id) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("container {id} was never removed from the registry");
}

#[tokio::test]
async fn happy_path_from_create_to_child_exit() {
    let Fixture {
        agent,
        runtime,
        gateways,
    } = fixture(&[]);
    let mut events = agent.events().subscribe();

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Preloaded);

    agent
        .set_capabilities(id, &["net".to_string()])
        .await
        .unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Ready);
    assert_eq!(
        gateways.log(),
        vec!["config:alpha", "config:beta", "activate:alpha", "activate:beta"]
    );

    let pid = agent
        .execute(id, "/bin/true", Path::new("/"), None, &HashMap::new())
        .await
        .unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Running);

    runtime.complete_child(0);

    // The observer fires with the exit details, then the container
    // terminates and leaves the registry.
    let mut saw_process_event = false;
    let mut states = Vec::new();
    for _ in 0..8 {
        match tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("event stream stalled")
            .unwrap()
        {
            ContainerEvent::ProcessStateChanged {
                id: event_id,
                pid: event_pid,
                is_running,
                exit_code,
                ..
            } => {
                assert_eq!(event_id, id);
                assert_eq!(event_pid, pid);
                assert!(!is_running);
                assert_eq!(exit_code, 0);
                saw_process_event = true;
            }
            ContainerEvent::StateChanged { to, .. } => {
                states.push(to);
                if to == LifecycleState::Terminated {
                    break;
                }
            }
        }
    }
    assert!(saw_process_event);
    assert_eq!(
        states,
        vec![
            LifecycleState::Preloaded,
            LifecycleState::Ready,
            LifecycleState::Running,
            LifecycleState::Terminated
        ]
    );

    wait_until_gone(&agent, id).await;

    // Teardown ran in reverse insertion order before the runtime went away.
    let log = gateways.log();
    assert_eq!(
        &log[log.len() - 2..],
        &["teardown:beta".to_string(), "teardown:alpha".to_string()]
    );
    assert!(runtime.calls().contains(&"destroy".to_string()));
}

#[tokio::test]
async fn activation_failure_rolls_back_and_returns_to_preloaded() {
    let Fixture {
        agent, gateways, ..
    } = fixture(&["beta"]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    let result = agent.set_capabilities(id, &["net".to_string()]).await;
    assert!(result.is_err());

    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Preloaded);

    // Alpha activated first and was torn down during rollback; beta never
    // reached the activated state so only its activation attempt is logged.
    let log = gateways.log();
    assert!(log.contains(&"activate:alpha".to_string()));
    assert!(log.contains(&"activate:beta".to_string()));
    assert!(log.contains(&"teardown:alpha".to_string()));

    // The container is still usable: a capability set without the failing
    // gateway applies cleanly.
    agent
        .set_capabilities(id, &["audio".to_string()])
        .await
        .unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Ready);
}

#[tokio::test]
async fn unknown_capability_is_rejected_atomically() {
    let Fixture { agent, gateways, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    let err = agent
        .set_capabilities(id, &["net".to_string(), "bogus".to_string()])
        .await
        .unwrap_err();

    match err {
        SupervisorError::UnknownCapability(name) => assert_eq!(name, "bogus"),
        other => panic!("expected UnknownCapability, got {other:?}"),
    }
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Preloaded);
    assert!(gateways.log().is_empty());
}

#[tokio::test]
async fn ids_are_unique_and_never_reused() {
    let Fixture { agent, .. } = fixture(&[]);

    let first = agent.create(MINIMAL_OPTIONS).await.unwrap();
    let second = agent.create(MINIMAL_OPTIONS).await.unwrap();
    let third = agent.create(MINIMAL_OPTIONS).await.unwrap();

    assert!(first.as_i32() > 0);
    assert!(first < second && second < third);
    assert_eq!(agent.list(), vec![first, second, third]);

    agent.destroy(second).await.unwrap();
    let fourth = agent.create(MINIMAL_OPTIONS).await.unwrap();
    assert!(fourth > third);
    assert_eq!(agent.list(), vec![first, third, fourth]);
}

#[tokio::test]
async fn no_operation_succeeds_after_destroy() {
    let Fixture { agent, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    agent.destroy(id).await.unwrap();

    assert!(matches!(
        agent.state(id).await,
        Err(SupervisorError::NoSuchContainer(_))
    ));
    assert!(agent
        .set_capabilities(id, &["net".to_string()])
        .await
        .is_err());
    assert!(agent
        .execute(id, "/bin/true", Path::new("/"), None, &HashMap::new())
        .await
        .is_err());
    assert!(agent.destroy(id).await.is_err());
    assert!(agent
        .bind_mount(id, Path::new("/tmp"), Path::new("/tmp"), true)
        .await
        .is_err());
}

#[tokio::test]
async fn execute_requires_capabilities_to_be_set() {
    let Fixture { agent, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    let err = agent
        .execute(id, "/bin/true", Path::new("/"), None, &HashMap::new())
        .await
        .unwrap_err();

    match err {
        SupervisorError::State { state, .. } => assert_eq!(state, LifecycleState::Preloaded),
        other => panic!("expected a state error, got {other:?}"),
    }
}

#[tokio::test]
async fn suspend_and_resume_cycle() {
    let Fixture { agent, runtime, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    agent
        .set_capabilities(id, &["audio".to_string()])
        .await
        .unwrap();
    agent
        .execute(id, "sleep 60", Path::new("/"), None, &HashMap::new())
        .await
        .unwrap();

    // Suspending anything but a running container is a state error.
    agent.suspend(id).await.unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Suspended);
    assert!(agent.suspend(id).await.is_err());

    agent.resume(id).await.unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Running);
    assert!(agent.resume(id).await.is_err());

    let calls = runtime.calls();
    assert!(calls.contains(&"suspend".to_string()));
    assert!(calls.contains(&"resume".to_string()));
}

#[tokio::test]
async fn create_rejects_bad_options() {
    let Fixture { agent, .. } = fixture(&[]);

    assert!(matches!(
        agent.create("").await,
        Err(SupervisorError::InvalidConfig(detail)) if detail == "empty"
    ));
    assert!(matches!(
        agent.create(r#"[{"WRONG": true}]"#).await,
        Err(SupervisorError::InvalidConfig(detail)) if detail == "missing:writeBufferEnabled"
    ));
    assert!(agent.list().is_empty());
}

#[tokio::test]
async fn growing_the_capability_set_extends_the_running_gateways() {
    let Fixture { agent, gateways, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    agent
        .set_capabilities(id, &["audio".to_string()])
        .await
        .unwrap();
    assert_eq!(gateways.log(), vec!["config:alpha", "activate:alpha"]);

    // The desired set grew; the alpha gateway is already activated and
    // stays untouched, only the new beta gateway comes up.
    agent
        .set_capabilities(id, &["audio".to_string(), "net".to_string()])
        .await
        .unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Ready);

    assert_eq!(
        gateways.log(),
        vec![
            "config:alpha",
            "activate:alpha",
            "config:beta",
            "activate:beta"
        ]
    );
}

#[tokio::test]
async fn removing_a_capability_recomputes_from_scratch() {
    let Fixture { agent, gateways, .. } = fixture(&[]);

    let id = agent.create(MINIMAL_OPTIONS).await.unwrap();
    agent
        .set_capabilities(id, &["net".to_string()])
        .await
        .unwrap();
    assert_eq!(
        gateways.log(),
        vec!["config:alpha", "config:beta", "activate:alpha", "activate:beta"]
    );

    // Dropping "net" from the desired set tears everything down in reverse
    // insertion order and rebuilds only what "audio" implies.
    agent
        .set_capabilities(id, &["audio".to_string()])
        .await
        .unwrap();
    assert_eq!(agent.state(id).await.unwrap(), LifecycleState::Ready);

    assert_eq!(
        gateways.log(),
        vec![
            "config:alpha",
            "config:beta",
            "activate:alpha",
            "activate:beta",
            "teardown:beta",
            "teardown:alpha",
            "config:alpha",
            "activate:alpha"
        ]
    );
}

#[tokio::test]
async fn agent_shutdown_destroys_all_containers() {
    let Fixture { agent, runtime, .. } = fixture(&[]);

    agent.create(MINIMAL_OPTIONS).await.unwrap();
    agent.create(MINIMAL_OPTIONS).await.unwrap();
    assert_eq!(agent.list().len(), 2);

    agent.shutdown().await;
    assert!(agent.list().is_empty());
    assert_eq!(
        runtime
            .calls()
            .iter()
            .filter(|call| call.as_str() == "destroy")
            .count(),
        2
    );
}

#[tokio::test]
async fn list_capabilities_reports_the_store() {
    let Fixture { agent, .. } = fixture(&[]);
    assert_eq!(agent.list_capabilities(), vec!["audio", "net"]);
}
