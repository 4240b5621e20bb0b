// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Supervision of the external D-Bus filtering proxy.
//
// The proxy is out-of-tree and treated as a black box: it is invoked as
// `<binary> <socket-path> session|system`, receives its filter rules as
// compact JSON on stdin, and serves a UNIX socket at the given path. One
// supervisor instance exists per bus per container.

use crate::domain::gateway::GATEWAY_DIR_IN_CONTAINER;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

/// How often and how long to poll for the proxy socket to appear.
pub const SOCKET_POLL_ATTEMPTS: u32 = 1000;
pub const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to spawn d-bus proxy: {0}")]
    SpawnFailed(#[source] io::Error),
    #[error("host environment does not define {0}")]
    MissingHostAddress(&'static str),
    #[error("failed to write configuration to d-bus proxy stdin: {0}")]
    StdinFailed(#[source] io::Error),
    #[error("d-bus proxy socket {0} did not appear in time")]
    SocketTimeout(PathBuf),
    #[error("d-bus proxy exited before its socket could be recorded")]
    ExitedEarly,
    #[error("failed to reap d-bus proxy: {0}")]
    ReapFailed(#[source] io::Error),
    #[error("failed to unlink d-bus proxy socket {path}: {source}")]
    UnlinkFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Which bus a proxy instance filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Session,
    System,
}

impl BusType {
    /// Name of the environment variable carrying the bus address.
    pub fn address_variable(&self) -> &'static str {
        match self {
            BusType::Session => "DBUS_SESSION_BUS_ADDRESS",
            BusType::System => "DBUS_SYSTEM_BUS_ADDRESS",
        }
    }

    pub fn socket_prefix(&self) -> &'static str {
        match self {
            BusType::Session => "sess_",
            BusType::System => "sys_",
        }
    }

    pub fn mode_argument(&self) -> &'static str {
        match self {
            BusType::Session => "session",
            BusType::System => "system",
        }
    }
}

pub struct DBusProxySupervisor {
    bus: BusType,
    proxy_binary: PathBuf,
    socket_path: PathBuf,
    child: Option<Child>,
    pid: Option<u32>,
}

impl DBusProxySupervisor {
    pub fn new(
        bus: BusType,
        proxy_binary: &Path,
        gateway_dir: &Path,
        container_name: &str,
    ) -> Self {
        let socket_path =
            gateway_dir.join(format!("{}{}.sock", bus.socket_prefix(), container_name));
        Self {
            bus,
            proxy_binary: proxy_binary.to_path_buf(),
            socket_path,
            child: None,
            pid: None,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bus address as seen from inside the container, where the socket
    /// directory is exposed as the gateway directory.
    pub fn container_address(&self) -> String {
        let basename = self
            .socket_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("unix:path={GATEWAY_DIR_IN_CONTAINER}/{basename}")
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Spawn the proxy, feed it the merged configuration and wait for its
    /// socket to appear.
    ///
    /// A session proxy refuses to start when the host has no
    /// `DBUS_SESSION_BUS_ADDRESS`; a system proxy only warns. If the socket
    /// never appears, the child is reaped before the failure is reported so
    /// that a failed start never leaves a live proxy behind.
    pub async fn start(&mut self, config: &Value) -> Result<u32, ProxyError> {
        if let Some(parent) = self.socket_path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return Err(ProxyError::SpawnFailed(err));
            }
        }

        let variable = self.bus.address_variable();
        let mut command = Command::new(&self.proxy_binary);
        command
            .arg(&self.socket_path)
            .arg(self.bus.mode_argument())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match std::env::var(variable) {
            Ok(address) => {
                command.env(variable, address);
            }
            Err(_) if self.bus == BusType::Session => {
                error!(
                    variable,
                    "session proxy requested but the host bus address is not set"
                );
                return Err(ProxyError::MissingHostAddress(variable));
            }
            Err(_) => {
                warn!(
                    variable,
                    "system proxy starting without a host bus address, this could be a problem"
                );
            }
        }

        let mut child = command.spawn().map_err(ProxyError::SpawnFailed)?;

        let payload = config.to_string();
        debug!(bus = self.bus.mode_argument(), config = %payload, "feeding proxy configuration");
        match child.stdin.take() {
            Some(mut stdin) => {
                if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                    let _ = self.reap(&mut child).await;
                    return Err(ProxyError::StdinFailed(err));
                }
                // Dropping the handle closes the pipe; the proxy reads until EOF.
                drop(stdin);
            }
            None => {
                let _ = self.reap(&mut child).await;
                return Err(ProxyError::StdinFailed(io::Error::other(
                    "child stdin was not captured",
                )));
            }
        }

        if !self.await_socket().await {
            let _ = self.reap(&mut child).await;
            return Err(ProxyError::SocketTimeout(self.socket_path.clone()));
        }

        let Some(pid) = child.id() else {
            let _ = self.remove_socket().await;
            return Err(ProxyError::ExitedEarly);
        };

        debug!(bus = self.bus.mode_argument(), pid, socket = %self.socket_path.display(), "d-bus proxy started");
        self.pid = Some(pid);
        self.child = Some(child);
        Ok(pid)
    }

    /// Stop the proxy and remove its socket.
    ///
    /// Every step runs even when an earlier one fails; the first failure is
    /// reported.
    pub async fn stop(&mut self) -> Result<(), ProxyError> {
        let mut first_failure = None;

        if let Some(mut child) = self.child.take() {
            if let Err(err) = self.reap(&mut child).await {
                error!(bus = self.bus.mode_argument(), error = %err, "failed to reap d-bus proxy");
                first_failure.get_or_insert(err);
            }
        } else {
            warn!(
                bus = self.bus.mode_argument(),
                "stopping d-bus proxy that was never started"
            );
        }
        self.pid = None;

        if let Err(err) = self.remove_socket().await {
            error!(bus = self.bus.mode_argument(), error = %err, "failed to unlink proxy socket");
            first_failure.get_or_insert(err);
        }

        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// SIGTERM the child if it is still alive, then wait for it to exit. The
    /// wait is unbounded.
    async fn reap(&self, child: &mut Child) -> Result<(), ProxyError> {
        let alive = matches!(child.try_wait(), Ok(None));
        if alive {
            if let Some(pid) = child.id() {
                unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            }
        }
        child.wait().await.map(|_| ()).map_err(ProxyError::ReapFailed)
    }

    async fn await_socket(&self) -> bool {
        for _ in 0..SOCKET_POLL_ATTEMPTS {
            if self.socket_path.exists() {
                return true;
            }
            tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
        }
        false
    }

    async fn remove_socket(&self) -> Result<(), ProxyError> {
        match tokio::fs::remove_file(&self.socket_path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ProxyError::UnlinkFailed {
                path: self.socket_path.clone(),
                source: err,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_paths_are_prefixed_per_bus() {
        let session = DBusProxySupervisor::new(
            BusType::Session,
            Path::new("dbus-proxy"),
            Path::new("/run/vessel/gateways"),
            "vessel-7",
        );
        assert_eq!(
            session.socket_path(),
            Path::new("/run/vessel/gateways/sess_vessel-7.sock")
        );
        assert_eq!(
            session.container_address(),
            "unix:path=/gateways/sess_vessel-7.sock"
        );

        let system = DBusProxySupervisor::new(
            BusType::System,
            Path::new("dbus-proxy"),
            Path::new("/run/vessel/gateways"),
            "vessel-7",
        );
        assert_eq!(
            system.socket_path(),
            Path::new("/run/vessel/gateways/sys_vessel-7.sock")
        );
    }

    #[test]
    fn bus_variables() {
        assert_eq!(
            BusType::Session.address_variable(),
            "DBUS_SESSION_BUS_ADDRESS"
        );
        assert_eq!(BusType::System.address_variable(), "DBUS_SYSTEM_BUS_ADDRESS");
        assert_eq!(BusType::Session.mode_argument(), "session");
        assert_eq!(BusType::System.mode_argument(), "system");
    }

    #[tokio::test]
    async fn stop_without_start_removes_nothing_and_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = DBusProxySupervisor::new(
            BusType::System,
            Path::new("dbus-proxy"),
            dir.path(),
            "vessel-1",
        );
        assert!(supervisor.stop().await.is_ok());
    }

    #[tokio::test]
    async fn stop_unlinks_a_leftover_socket() {
        let dir = tempfile::tempdir().unwrap();
        let mut supervisor = DBusProxySupervisor::new(
            BusType::System,
            Path::new("dbus-proxy"),
            dir.path(),
            "vessel-1",
        );
        std::fs::write(supervisor.socket_path(), b"").unwrap();

        supervisor.stop().await.unwrap();
        assert!(!supervisor.socket_path().exists());
    }
}
