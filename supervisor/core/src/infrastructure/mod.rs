// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod dbus_proxy;
pub mod event_bus;
pub mod gateways;
pub mod netlink;
pub mod runtime;
