// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default size of the temporary filesystem write buffer: 100 MiB.
pub const DEFAULT_TEMPORARY_FILESYSTEM_SIZE: u64 = 100 * 1024 * 1024;

/// Identifier of a container managed by this agent.
///
/// Ids are allocated from a monotonically increasing counter starting at 1
/// and are never reused for the lifetime of the agent process. Id 0 is never
/// handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub i32);

impl ContainerId {
    pub fn as_i32(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The states a container moves through, from creation to teardown.
///
/// Valid transitions:
///
/// ```text
/// Created --preload--> Preloaded --set_capabilities--> Ready --execute--> Running
/// Running --suspend--> Suspended --resume--> Running
/// any non-terminal --destroy--> Terminated
/// Running --child exit--> Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Preloaded,
    Ready,
    Running,
    Suspended,
    Terminated,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Terminated)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Preloaded => "preloaded",
            LifecycleState::Ready => "ready",
            LifecycleState::Running => "running",
            LifecycleState::Suspended => "suspended",
            LifecycleState::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

/// Per-container options passed with the Create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicContainerOptions {
    /// Enable the write buffer for the container filesystem.
    pub write_buffer_enabled: bool,

    /// Back the write buffer with a tmpfs instead of persistent storage.
    pub temporary_filesystem_write_buffer_enabled: bool,

    /// Size of the tmpfs in bytes.
    pub temporary_filesystem_size: u64,
}

impl Default for DynamicContainerOptions {
    fn default() -> Self {
        Self {
            write_buffer_enabled: false,
            temporary_filesystem_write_buffer_enabled: false,
            temporary_filesystem_size: DEFAULT_TEMPORARY_FILESYSTEM_SIZE,
        }
    }
}
