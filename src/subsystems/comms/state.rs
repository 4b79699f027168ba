//! Shared state for the intake channels.
//!
//! Channels hold an `Arc<CommsState>` and only reach the supervisor through
//! the typed methods below; the raw [`BusHandle`] stays private.

use tokio::sync::mpsc;
use tracing::warn;

use crate::commands::{Choice, CommandError, Invocation};
use crate::error::AppError;
use crate::model::GuildId;
use crate::semester::{DispatchOutcome, ReactionEvent};
use crate::supervisor::bus::BusHandle;

/// Events a channel reports back to the comms manager.
#[derive(Debug)]
pub enum CommsEvent {
    ChannelShutdown { channel_id: String },
    SessionStarted { channel_id: String },
}

/// Static facts reported by health endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommsInfo {
    pub bot_name: String,
    pub platform: String,
    pub store: String,
}

pub struct CommsState {
    bus: BusHandle,
    event_tx: mpsc::Sender<CommsEvent>,
    pub info: CommsInfo,
}

fn bus_error(e: impl std::fmt::Display) -> AppError {
    AppError::Comms(format!("bus error: {e}"))
}

impl CommsState {
    pub fn new(bus: BusHandle, event_tx: mpsc::Sender<CommsEvent>, info: CommsInfo) -> Self {
        Self { bus, event_tx, info }
    }

    pub async fn submit_reaction(&self, event: ReactionEvent) -> Result<DispatchOutcome, AppError> {
        self.bus.reaction(event).await.map_err(bus_error)
    }

    pub async fn run_command(&self, name: &str, invocation: Invocation) -> Result<Result<String, CommandError>, AppError> {
        self.bus.command(name, invocation).await.map_err(bus_error)
    }

    pub async fn autocomplete(
        &self,
        name: &str,
        guild: GuildId,
        partial: &str,
    ) -> Result<Result<Vec<Choice>, CommandError>, AppError> {
        self.bus.autocomplete(name, guild, partial).await.map_err(bus_error)
    }

    pub async fn register_guild(&self, id: GuildId, name: &str) -> Result<(), AppError> {
        self.bus.guild_available(id, name).await.map_err(bus_error)
    }

    /// Non-blocking; drops the event with a warning when the manager is
    /// behind or gone.
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
