// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::container::{ContainerId, LifecycleState};
use crate::domain::runtime::RuntimeError;
use thiserror::Error;

/// The error surface of the supervisor engine.
///
/// Module-local errors (gateway parsing, netlink, proxy supervision) are
/// converted into this taxonomy at the lifecycle and agent boundaries; the IPC
/// facade only ever sees these kinds.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// JSON structure or value violation. Never mutates state.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A capability name could not be resolved. The whole set-capabilities
    /// request is rejected without partial application.
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    /// Host-side network configuration failed.
    #[error("network setup failed: {0}")]
    NetworkSetupFailure(String),

    /// The host bridge the network gateway depends on is not available.
    #[error("host bridge '{device}' is not available at {address}")]
    BridgeMissing { device: String, address: String },

    /// The external D-Bus proxy could not be spawned or configured.
    #[error("d-bus proxy failure: {0}")]
    ProxyFailure(String),

    /// Opaque failure from the container runtime backend.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Operation requested in an incompatible lifecycle state.
    #[error("cannot {operation} container in state {state}")]
    State {
        operation: &'static str,
        state: LifecycleState,
    },

    /// No container is registered under the given id. Raised for ids that
    /// were never allocated and for containers already destroyed.
    #[error("no such container: {0}")]
    NoSuchContainer(ContainerId),

    /// One or more gateways failed to tear down. The container still reaches
    /// the terminated state.
    #[error("gateway teardown incomplete: {failed} gateway(s) failed")]
    GatewayTeardownIncomplete { failed: usize },

    /// Gateway configuration or activation failed.
    #[error("gateway '{gateway}' failed: {reason}")]
    Gateway { gateway: String, reason: String },
}
