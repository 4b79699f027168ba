//! Handlers for `/api/*` routes.

use std::time::Duration;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::AxumState;
use crate::commands::{CommandError, Invocation};
use crate::model::GuildId;
use crate::semester::{DispatchOutcome, ReactionEvent};

/// Provisioning a full semester makes well over a hundred platform calls.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
const EVENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
pub(super) struct CommandRequest {
    name: String,
    #[serde(flatten)]
    invocation: Invocation,
}

#[derive(Deserialize)]
pub(super) struct AutocompleteQuery {
    guild: GuildId,
    #[serde(default)]
    partial: String,
}

#[derive(Deserialize)]
pub(super) struct GuildRequest {
    id: GuildId,
    #[serde(default)]
    name: String,
}

fn json_error(status: StatusCode, code: &str, msg: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": code, "message": format!("{msg}") }))).into_response()
}

fn timed_out(what: &str) -> Response {
    json_error(StatusCode::GATEWAY_TIMEOUT, "timeout", format!("{what} timed out"))
}

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    let info = &state.comms.info;
    Json(json!({
        "status": "ok",
        "bot_name": info.bot_name,
        "platform": info.platform,
        "store": info.store,
    }))
    .into_response()
}

/// POST /api/reactions
pub(super) async fn reaction(State(state): State<AxumState>, Json(event): Json<ReactionEvent>) -> Response {
    match tokio::time::timeout(EVENT_TIMEOUT, state.comms.submit_reaction(event)).await {
        Ok(Ok(outcome)) => {
            let body = match &outcome {
                DispatchOutcome::Granted { group, role } => {
                    json!({ "applied": true, "action": "granted", "group": group, "role": role })
                }
                DispatchOutcome::Revoked { group, role } => {
                    json!({ "applied": true, "action": "revoked", "group": group, "role": role })
                }
                DispatchOutcome::Discarded(reason) => {
                    json!({ "applied": false, "action": "discarded", "reason": reason.to_string() })
                }
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, "reaction submit failed: {e}");
            json_error(StatusCode::BAD_GATEWAY, "internal", e)
        }
        Err(_) => timed_out("reaction"),
    }
}

fn command_status(e: &CommandError) -> StatusCode {
    match e {
        CommandError::Unknown(_) => StatusCode::NOT_FOUND,
        CommandError::Usage(_) => StatusCode::BAD_REQUEST,
        CommandError::Forbidden(_) => StatusCode::FORBIDDEN,
        CommandError::Failed(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

/// POST /api/commands
pub(super) async fn command(State(state): State<AxumState>, Json(req): Json<CommandRequest>) -> Response {
    match tokio::time::timeout(COMMAND_TIMEOUT, state.comms.run_command(&req.name, req.invocation)).await {
        Ok(Ok(Ok(message))) => (StatusCode::OK, Json(json!({ "ok": true, "message": message }))).into_response(),
        Ok(Ok(Err(e))) => {
            (command_status(&e), Json(json!({ "ok": false, "message": e.to_string() }))).into_response()
        }
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, command = %req.name, "command submit failed: {e}");
            json_error(StatusCode::BAD_GATEWAY, "internal", e)
        }
        Err(_) => timed_out("command"),
    }
}

/// GET /api/commands/{name}/autocomplete
pub(super) async fn autocomplete(
    State(state): State<AxumState>,
    Path(name): Path<String>,
    Query(q): Query<AutocompleteQuery>,
) -> Response {
    match tokio::time::timeout(EVENT_TIMEOUT, state.comms.autocomplete(&name, q.guild, &q.partial)).await {
        Ok(Ok(Ok(choices))) => (StatusCode::OK, Json(json!({ "choices": choices }))).into_response(),
        Ok(Ok(Err(e))) => json_error(command_status(&e), "command", e),
        Ok(Err(e)) => {
            warn!(channel_id = %state.channel_id, command = %name, "autocomplete failed: {e}");
            json_error(StatusCode::BAD_GATEWAY, "internal", e)
        }
        Err(_) => timed_out("autocomplete"),
    }
}

/// POST /api/guilds
pub(super) async fn guild(State(state): State<AxumState>, Json(req): Json<GuildRequest>) -> Response {
    match state.comms.register_guild(req.id, &req.name).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "ok": true }))).into_response(),
        Err(e) => {
            warn!(channel_id = %state.channel_id, "guild registration failed: {e}");
            json_error(StatusCode::BAD_GATEWAY, "internal", e)
        }
    }
}
