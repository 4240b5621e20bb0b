// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # vessel-core
//!
//! The container lifecycle and gateway orchestration engine of VESSEL. This
//! crate owns the per-container state machine, the gateway plug-in framework,
//! capability expansion, the host-side netlink client and the supervision of
//! the external D-Bus filtering proxy.
//!
//! ## Layer Structure
//!
//! ```text
//! application/    ← ContainerLifecycle state machine, AgentCore registry
//!     ↓
//! domain/         ← Container types, gateway contract, capability store,
//!                   runtime trait, error taxonomy
//!     ↓
//! infrastructure/ ← Netlink client, D-Bus proxy supervisor, LXC runtime
//!                   adapter, concrete gateways, event bus
//! ```
//!
//! The message-bus facade that exposes the agent on an IPC bus is *not* part
//! of this crate; [`application::agent::AgentCore`] is the typed call surface
//! such a facade consumes. The OS container mechanics live behind
//! [`domain::runtime::ContainerRuntime`].
//!
//! ## Integration Tests
//!
//! See `supervisor/core/tests/` for lifecycle scenarios driven through a mock
//! runtime.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
