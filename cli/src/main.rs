// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # VESSEL Agent
//!
//! The `vessel-agent` binary is the host-side supervisor daemon. It loads the
//! agent configuration and the capability store, wires the LXC runtime and
//! the production gateways into an [`AgentCore`], and runs until it receives
//! a termination signal. Live containers are destroyed on shutdown; the agent
//! keeps no state across restarts.
//!
//! Exit codes: 0 on clean shutdown, 1 when startup prerequisites are missing
//! (unparseable configuration, unreadable capability store).

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use vessel_core::application::AgentCore;
use vessel_core::domain::agent_config::AgentConfig;
use vessel_core::domain::capability::CapabilityStore;
use vessel_core::infrastructure::gateways::DefaultGatewayFactory;
use vessel_core::infrastructure::runtime::LxcRuntimeFactory;

/// VESSEL agent - supervise application sandboxes on this host
#[derive(Parser)]
#[command(name = "vessel-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the agent configuration file (overrides discovery)
    #[arg(
        short,
        long,
        env = "VESSEL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Path to the capability store (overrides the configuration file)
    #[arg(long, env = "VESSEL_CAPABILITIES_FILE", value_name = "FILE")]
    capabilities: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VESSEL_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

// The engine serializes per-container work and treats host calls as
// blocking; a single-threaded runtime is the intended schedule.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        eprintln!("{} {err:#}", "vessel-agent failed to start:".red());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    init_logging(&cli.log_level)?;

    let mut config = AgentConfig::load_or_default(cli.config)?;
    if let Some(capabilities) = cli.capabilities {
        config.capabilities.file = capabilities;
    }
    config
        .validate()
        .context("agent configuration is invalid")?;

    let store = CapabilityStore::load(&config.capabilities.file)
        .context("failed to load the capability store")?;

    let config = Arc::new(config);
    let agent = AgentCore::new(
        config.clone(),
        store,
        Arc::new(LxcRuntimeFactory::new(config.clone())),
        Arc::new(DefaultGatewayFactory::new(config.clone())),
    );

    info!(
        bridge = %config.network.bridge_device,
        capabilities = %config.capabilities.file.display(),
        "vessel agent is up"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for the termination signal")?;

    info!("termination signal received, destroying live containers");
    agent.shutdown().await;
    if !agent.list().is_empty() {
        error!("some containers could not be destroyed");
    }
    info!("vessel agent stopped");
    Ok(())
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    Ok(())
}
