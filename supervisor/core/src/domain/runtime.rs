// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::container::{ContainerId, DynamicContainerOptions};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to create container: {0}")]
    CreateFailed(String),
    #[error("failed to start container: {0}")]
    StartFailed(String),
    #[error("failed to attach to container: {0}")]
    AttachFailed(String),
    #[error("failed to bind mount into container: {0}")]
    MountFailed(String),
    #[error("failed to set container environment: {0}")]
    EnvFailed(String),
    #[error("failed to suspend container: {0}")]
    SuspendFailed(String),
    #[error("failed to resume container: {0}")]
    ResumeFailed(String),
    #[error("failed to destroy container: {0}")]
    DestroyFailed(String),
    #[error("no attached process with pid {0}")]
    UnknownProcess(i32),
}

/// The capability set the lifecycle consumes from the OS container backend.
///
/// The supervisor never implements namespace/cgroup/chroot mechanics itself;
/// everything below is delegated to an external runtime. One handle exists per
/// container and is shared by the lifecycle and its gateways.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create the container's root filesystem and runtime object.
    async fn create(&self) -> Result<(), RuntimeError>;

    /// Start the container with no user workload. Returns the init pid.
    async fn start(&self) -> Result<i32, RuntimeError>;

    /// Run a command inside the container. Returns the pid of the attached
    /// process.
    async fn attach(
        &self,
        command: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
        stdout_file: Option<&Path>,
    ) -> Result<i32, RuntimeError>;

    /// Wait for an attached process to exit and return its exit code. This is
    /// the SIGCHLD-equivalent seam the lifecycle's exit observer builds on.
    async fn wait(&self, pid: i32) -> Result<i32, RuntimeError>;

    /// Bind-mount a host path (file or directory) into the container.
    /// Returns the path as visible inside the container.
    async fn bind_mount(
        &self,
        host_path: &Path,
        container_path: &Path,
        readonly: bool,
    ) -> Result<PathBuf, RuntimeError>;

    /// Create a symbolic link inside the container filesystem.
    async fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), RuntimeError>;

    /// Export an environment variable to every subsequently attached process.
    async fn set_env(&self, name: &str, value: &str) -> Result<(), RuntimeError>;

    /// Write a cgroup setting for the container.
    async fn set_cgroup_item(&self, setting: &str, value: &str) -> Result<(), RuntimeError>;

    async fn suspend(&self) -> Result<(), RuntimeError>;

    async fn resume(&self) -> Result<(), RuntimeError>;

    /// Stop and remove the container. The timeout bounds the stop step only.
    async fn destroy(&self, timeout: Duration) -> Result<(), RuntimeError>;
}

/// Produces one runtime handle per container.
pub trait RuntimeFactory: Send + Sync {
    fn create_runtime(
        &self,
        id: ContainerId,
        name: &str,
        options: &DynamicContainerOptions,
    ) -> Result<Arc<dyn ContainerRuntime>, RuntimeError>;
}
