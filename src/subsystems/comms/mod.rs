//! Comms subsystem: the operator and event intake channels.
//!
//! Each channel (PTY console, HTTP intake) implements [`Component`] and is
//! spawned by [`start`] through [`spawn_components`].  Channels capture an
//! `Arc<CommsState>` at construction.  A small `mpsc` queue carries channel
//! lifecycle events back to a drain task that only logs them.

#[cfg(feature = "channel-axum")]
pub mod axum_channel;
#[cfg(feature = "channel-pty")]
pub mod pty;
mod state;

pub use state::{CommsEvent, CommsInfo, CommsState};

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Config;
use crate::subsystems::runtime::{Component, SubsystemHandle, spawn_components};
use crate::supervisor::bus::BusHandle;

/// Spawn every configured channel.  Returns as soon as the tasks exist.
pub fn start(config: &Config, bus: BusHandle, info: CommsInfo, shutdown: CancellationToken) -> SubsystemHandle {
    let (event_tx, event_rx) = mpsc::channel::<CommsEvent>(32);
    let state = Arc::new(CommsState::new(bus, event_tx, info));

    let mut components: Vec<Box<dyn Component>> = Vec::new();

    #[cfg(feature = "channel-pty")]
    {
        if config.comms_pty_should_load() {
            info!("loading pty channel");
            components.push(Box::new(pty::PtyChannel::new("pty0", state.clone())));
        }
    }

    #[cfg(feature = "channel-axum")]
    {
        if config.comms_http_should_load() {
            info!(bind = %config.comms.http.bind, "loading http intake");
            components.push(Box::new(axum_channel::AxumChannel::new(
                "http0",
                config.comms.http.bind.clone(),
                state.clone(),
            )));
        }
    }

    if components.is_empty() {
        info!("no comms channels configured, waiting for shutdown");
    }
    drop(state);

    tokio::spawn(async move {
        let mut rx = event_rx;
        while let Some(event) = rx.recv().await {
            match event {
                CommsEvent::ChannelShutdown { ref channel_id } => debug!(channel_id, "channel reported shutdown"),
                CommsEvent::SessionStarted { ref channel_id } => debug!(channel_id, "channel session started"),
            }
        }
    });

    spawn_components(components, shutdown)
}
