// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::container::{ContainerId, LifecycleState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events published on the supervisor's event bus.
///
/// `ProcessStateChanged` is the engine-side form of the IPC signal of the
/// same name; the facade forwards it verbatim. Observers receive events in
/// the order the underlying child-exit events arrived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContainerEvent {
    StateChanged {
        id: ContainerId,
        from: LifecycleState,
        to: LifecycleState,
        at: DateTime<Utc>,
    },
    ProcessStateChanged {
        id: ContainerId,
        pid: i32,
        is_running: bool,
        exit_code: i32,
        at: DateTime<Utc>,
    },
}

impl ContainerEvent {
    pub fn container_id(&self) -> ContainerId {
        match self {
            ContainerEvent::StateChanged { id, .. } => *id,
            ContainerEvent::ProcessStateChanged { id, .. } => *id,
        }
    }
}
