//! Axum HTTP intake: reactions, commands and guild registration as JSON.
//!
//! ```text
//! GET  /api/health
//! POST /api/reactions                        ReactionEvent
//! POST /api/commands                         {name, guild, args, admin}
//! GET  /api/commands/{name}/autocomplete     ?guild=&partial=
//! POST /api/guilds                           {id, name}
//! ```

mod api;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::{CommsEvent, CommsState};
use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

/// Router state injected into every handler.
#[derive(Clone)]
pub(crate) struct AxumState {
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(channel_id: impl Into<String>, bind_addr: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), bind_addr: bind_addr.into(), state }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = build_router(&channel_id, comms.clone());

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("http bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "http intake listening");
    comms.report_event(CommsEvent::SessionStarted { channel_id: channel_id.clone() });

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("http server error: {e}")))?;

    info!(%channel_id, "http intake shut down");
    comms.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

pub fn build_router(channel_id: &str, comms: Arc<CommsState>) -> Router {
    let state = AxumState { channel_id: Arc::from(channel_id), comms };
    Router::new()
        .route("/api/health",                       get(api::health))
        .route("/api/reactions",                    post(api::reaction))
        .route("/api/commands",                     post(api::command))
        .route("/api/commands/{name}/autocomplete", get(api::autocomplete))
        .route("/api/guilds",                       post(api::guild))
        .with_state(state)
}
