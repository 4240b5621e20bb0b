// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent;
pub mod lifecycle;

pub use agent::AgentCore;
pub use lifecycle::ContainerLifecycle;
