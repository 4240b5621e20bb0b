// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::gateway::{Gateway, GatewayError};
use crate::domain::runtime::ContainerRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Path of the pulse socket as exposed inside the container.
const PULSE_SOCKET_IN_CONTAINER: &str = "/gateways/pulse.sock";

/// Exposes the host's PulseAudio socket inside the container.
///
/// Config elements carry a single required `audio` boolean; once any element
/// enables audio it stays enabled.
pub struct PulseGateway {
    audio: bool,
    configured: bool,
    runtime: Option<Arc<dyn ContainerRuntime>>,
}

impl PulseGateway {
    pub const ID: &'static str = "pulseaudio";

    pub fn new() -> Self {
        Self {
            audio: false,
            configured: false,
            runtime: None,
        }
    }

    /// The host-side pulse socket: `PULSE_SERVER` when set, the user's
    /// runtime directory socket otherwise.
    fn host_socket() -> PathBuf {
        if let Ok(server) = std::env::var("PULSE_SERVER") {
            let path = server.strip_prefix("unix:").unwrap_or(&server);
            return PathBuf::from(path);
        }
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/pulse/native"))
    }
}

impl Default for PulseGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for PulseGateway {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn set_container(&mut self, runtime: Arc<dyn ContainerRuntime>) {
        self.runtime = Some(runtime);
    }

    fn set_config(&mut self, fragments: &[Value]) -> Result<(), GatewayError> {
        let mut audio = self.audio;
        for fragment in fragments {
            let object = fragment.as_object().ok_or_else(|| {
                GatewayError::Config("pulse gateway element is not an object".to_string())
            })?;
            match object.get("audio") {
                Some(Value::Bool(enabled)) => audio |= *enabled,
                Some(_) => {
                    return Err(GatewayError::Config(
                        "'audio' key is of wrong type".to_string(),
                    ))
                }
                None => {
                    return Err(GatewayError::Config("'audio' key is missing".to_string()))
                }
            }
        }

        self.audio = audio;
        self.configured = true;
        Ok(())
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn activate(&mut self) -> Result<(), GatewayError> {
        if !self.audio {
            debug!("audio is disabled, nothing to expose");
            return Ok(());
        }

        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| GatewayError::Activation("no container assigned".to_string()))?;

        let host_socket = Self::host_socket();
        runtime
            .bind_mount(&host_socket, Path::new(PULSE_SOCKET_IN_CONTAINER), false)
            .await
            .map_err(|err| GatewayError::Activation(err.to_string()))?;
        runtime
            .set_env("PULSE_SERVER", PULSE_SOCKET_IN_CONTAINER)
            .await
            .map_err(|err| GatewayError::Activation(err.to_string()))?;

        info!(socket = %host_socket.display(), "exposed pulse socket");
        Ok(())
    }

    async fn teardown(&mut self) -> Result<(), GatewayError> {
        Ok(())
    }
}
