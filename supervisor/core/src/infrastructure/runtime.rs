// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// LXC-backed implementation of the container runtime.
//
// The namespace/cgroup/chroot mechanics stay inside the host's LXC tooling;
// this adapter only builds command lines, tracks attached children so their
// exits can be observed, and maps failures onto RuntimeError. One instance
// exists per container.

use crate::domain::agent_config::AgentConfig;
use crate::domain::container::{ContainerId, DynamicContainerOptions};
use crate::domain::runtime::{ContainerRuntime, RuntimeError, RuntimeFactory};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub struct LxcRuntime {
    name: String,
    template: String,
    lxc_config: Option<PathBuf>,
    rootfs: PathBuf,
    options: DynamicContainerOptions,
    env: StdMutex<HashMap<String, String>>,
    children: Mutex<HashMap<i32, Child>>,
}

impl LxcRuntime {
    pub fn new(
        name: &str,
        template: &str,
        lxc_config: Option<&Path>,
        rootfs_base: &Path,
        options: DynamicContainerOptions,
    ) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            lxc_config: lxc_config.map(Path::to_path_buf),
            rootfs: rootfs_base.join(name).join("rootfs"),
            options,
            env: StdMutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn rootfs(&self) -> &Path {
        &self.rootfs
    }

    /// Resolve a container-absolute path against the container rootfs.
    fn rootfs_path(&self, container_path: &Path) -> PathBuf {
        match container_path.strip_prefix("/") {
            Ok(relative) => self.rootfs.join(relative),
            Err(_) => self.rootfs.join(container_path),
        }
    }

    async fn run(command: &mut Command) -> Result<String, String> {
        let output = command
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| err.to_string())?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

#[async_trait]
impl ContainerRuntime for LxcRuntime {
    async fn create(&self) -> Result<(), RuntimeError> {
        let mut command = Command::new("lxc-create");
        command.arg("-n").arg(&self.name).arg("-t").arg(&self.template);
        if let Some(config) = &self.lxc_config {
            command.arg("-f").arg(config);
        }
        if self.options.write_buffer_enabled {
            // The write buffer is an overlay over the read-only template
            // rootfs, optionally backed by a bounded tmpfs.
            command.arg("-B").arg("overlayfs");
            if self.options.temporary_filesystem_write_buffer_enabled {
                command
                    .arg("--fssize")
                    .arg(self.options.temporary_filesystem_size.to_string());
            }
        }

        Self::run(&mut command)
            .await
            .map_err(RuntimeError::CreateFailed)?;
        info!(container = %self.name, "created container");
        Ok(())
    }

    async fn start(&self) -> Result<i32, RuntimeError> {
        let mut command = Command::new("lxc-start");
        command.arg("-n").arg(&self.name).arg("-d");
        Self::run(&mut command)
            .await
            .map_err(RuntimeError::StartFailed)?;

        // -H prints the raw value, -p selects the init pid.
        let mut info_command = Command::new("lxc-info");
        info_command.arg("-n").arg(&self.name).arg("-p").arg("-H");
        let stdout = Self::run(&mut info_command)
            .await
            .map_err(RuntimeError::StartFailed)?;

        let pid: i32 = stdout
            .trim()
            .parse()
            .map_err(|_| RuntimeError::StartFailed(format!("unparseable init pid '{}'", stdout.trim())))?;

        info!(container = %self.name, pid, "started container");
        Ok(pid)
    }

    async fn attach(
        &self,
        command_line: &str,
        env: &HashMap<String, String>,
        cwd: &Path,
        stdout_file: Option<&Path>,
    ) -> Result<i32, RuntimeError> {
        let mut command = Command::new("lxc-attach");
        command.arg("-n").arg(&self.name).arg("--clear-env");

        let container_env = self
            .env
            .lock()
            .map_err(|_| RuntimeError::AttachFailed("environment map poisoned".to_string()))?
            .clone();
        for (name, value) in container_env.iter().chain(env.iter()) {
            command.arg("-v").arg(format!("{name}={value}"));
        }

        // lxc-attach has no working-directory flag; enter it in the shell.
        let shell_command = format!("cd {} && exec {}", cwd.display(), command_line);
        command.arg("--").arg("/bin/sh").arg("-c").arg(shell_command);

        match stdout_file {
            Some(path) => {
                let file = std::fs::File::create(path)
                    .map_err(|err| RuntimeError::AttachFailed(err.to_string()))?;
                command.stdout(Stdio::from(file));
            }
            None => {
                command.stdout(Stdio::null());
            }
        }
        command.stdin(Stdio::null()).stderr(Stdio::null()).kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|err| RuntimeError::AttachFailed(err.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| RuntimeError::AttachFailed("attached process exited immediately".to_string()))?
            as i32;

        self.children.lock().await.insert(pid, child);
        debug!(container = %self.name, pid, command = command_line, "attached process");
        Ok(pid)
    }

    async fn wait(&self, pid: i32) -> Result<i32, RuntimeError> {
        let mut child = self
            .children
            .lock()
            .await
            .remove(&pid)
            .ok_or(RuntimeError::UnknownProcess(pid))?;

        let status = child
            .wait()
            .await
            .map_err(|err| RuntimeError::AttachFailed(err.to_string()))?;
        // Signal-terminated children report no code.
        Ok(status.code().unwrap_or(-1))
    }

    async fn bind_mount(
        &self,
        host_path: &Path,
        container_path: &Path,
        readonly: bool,
    ) -> Result<PathBuf, RuntimeError> {
        let target = self.rootfs_path(container_path);

        let metadata = tokio::fs::metadata(host_path)
            .await
            .map_err(|err| RuntimeError::MountFailed(format!("{}: {err}", host_path.display())))?;

        if metadata.is_dir() {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|err| RuntimeError::MountFailed(err.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| RuntimeError::MountFailed(err.to_string()))?;
            }
            if !target.exists() {
                tokio::fs::write(&target, b"")
                    .await
                    .map_err(|err| RuntimeError::MountFailed(err.to_string()))?;
            }
        }

        let mut command = Command::new("mount");
        command.arg("--bind").arg(host_path).arg(&target);
        Self::run(&mut command)
            .await
            .map_err(RuntimeError::MountFailed)?;

        if readonly {
            let mut remount = Command::new("mount");
            remount
                .arg("-o")
                .arg("remount,bind,ro")
                .arg(&target);
            Self::run(&mut remount)
                .await
                .map_err(RuntimeError::MountFailed)?;
        }

        debug!(
            container = %self.name,
            host = %host_path.display(),
            target = %container_path.display(),
            readonly,
            "bind mounted"
        );
        Ok(container_path.to_path_buf())
    }

    async fn create_symlink(&self, target: &Path, link: &Path) -> Result<(), RuntimeError> {
        let link_path = self.rootfs_path(link);
        if let Some(parent) = link_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| RuntimeError::MountFailed(err.to_string()))?;
        }
        tokio::fs::symlink(target, &link_path)
            .await
            .map_err(|err| RuntimeError::MountFailed(err.to_string()))
    }

    async fn set_env(&self, name: &str, value: &str) -> Result<(), RuntimeError> {
        self.env
            .lock()
            .map_err(|_| RuntimeError::EnvFailed("environment map poisoned".to_string()))?
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn set_cgroup_item(&self, setting: &str, value: &str) -> Result<(), RuntimeError> {
        let mut command = Command::new("lxc-cgroup");
        command.arg("-n").arg(&self.name).arg(setting).arg(value);
        Self::run(&mut command)
            .await
            .map_err(RuntimeError::EnvFailed)?;
        Ok(())
    }

    async fn suspend(&self) -> Result<(), RuntimeError> {
        let mut command = Command::new("lxc-freeze");
        command.arg("-n").arg(&self.name);
        Self::run(&mut command)
            .await
            .map_err(RuntimeError::SuspendFailed)?;
        info!(container = %self.name, "suspended container");
        Ok(())
    }

    async fn resume(&self) -> Result<(), RuntimeError> {
        let mut command = Command::new("lxc-unfreeze");
        command.arg("-n").arg(&self.name);
        Self::run(&mut command)
            .await
            .map_err(RuntimeError::ResumeFailed)?;
        info!(container = %self.name, "resumed container");
        Ok(())
    }

    async fn destroy(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.children.lock().await.clear();

        let mut stop = Command::new("lxc-stop");
        stop.arg("-n")
            .arg(&self.name)
            .arg("-t")
            .arg(timeout.as_secs().to_string());
        if let Err(err) = Self::run(&mut stop).await {
            warn!(container = %self.name, error = %err, "lxc-stop failed, destroying anyway");
        }

        let mut destroy = Command::new("lxc-destroy");
        destroy.arg("-n").arg(&self.name);
        Self::run(&mut destroy)
            .await
            .map_err(RuntimeError::DestroyFailed)?;

        info!(container = %self.name, "destroyed container");
        Ok(())
    }
}

/// Produces an [`LxcRuntime`] per container from the agent configuration.
pub struct LxcRuntimeFactory {
    config: Arc<AgentConfig>,
}

impl LxcRuntimeFactory {
    pub fn new(config: Arc<AgentConfig>) -> Self {
        Self { config }
    }
}

impl RuntimeFactory for LxcRuntimeFactory {
    fn create_runtime(
        &self,
        _id: ContainerId,
        name: &str,
        options: &DynamicContainerOptions,
    ) -> Result<Arc<dyn ContainerRuntime>, RuntimeError> {
        Ok(Arc::new(LxcRuntime::new(
            name,
            &self.config.runtime.template,
            self.config.runtime.lxc_config.as_deref(),
            &self.config.runtime.rootfs_base,
            options.clone(),
        )))
    }
}
