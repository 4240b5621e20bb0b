// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_config;
pub mod capability;
pub mod container;
pub mod error;
pub mod events;
pub mod gateway;
pub mod gateway_config;
pub mod options;
pub mod runtime;
