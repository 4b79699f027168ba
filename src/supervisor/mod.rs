//! Supervisor: owns the event bus and handles messages one at a time.
//!
//! Every handler runs to completion before the next message is read, so a
//! provisioning run and a reaction for the same guild never interleave.  The
//! shutdown token is only observed between messages.

pub mod bus;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bus::{BusMessage, SupervisorBus};

use crate::commands::{CommandContext, CommandRegistry};
use crate::platform::SandboxPlatform;

/// Everything the supervisor's handlers need.
#[derive(Clone)]
pub struct SupervisorContext {
    pub commands: CommandContext,
    /// Set for the sandbox platform: guilds and reacting members are added to
    /// it as they are seen, standing in for the gateway's guild state.
    pub sandbox: Option<Arc<SandboxPlatform>>,
}

/// Run the supervisor message loop until `shutdown` is cancelled or every
/// bus sender is dropped.
pub async fn run(
    bus: SupervisorBus,
    shutdown: CancellationToken,
    ctx: SupervisorContext,
    registry: CommandRegistry,
) {
    // Drop our own sender so the loop ends once every intake is gone.
    let SupervisorBus { mut rx, handle } = bus;
    drop(handle);

    info!(commands = ?registry.names(), "supervisor ready");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("supervisor shutting down");
                break;
            }

            msg = rx.recv() => {
                match msg {
                    Some(msg) => handle_message(&ctx, &registry, msg).await,
                    None => {
                        info!("bus closed, supervisor exiting");
                        break;
                    }
                }
            }
        }
    }
}

async fn handle_message(ctx: &SupervisorContext, registry: &CommandRegistry, msg: BusMessage) {
    match msg {
        BusMessage::Reaction { event, reply_tx } => {
            if let Some(sandbox) = &ctx.sandbox {
                sandbox.add_member(event.guild_id, event.user_id);
            }
            let outcome = ctx.commands.service.dispatch(&event).await;
            let _ = reply_tx.send(outcome);
        }
        BusMessage::Command { name, invocation, reply_tx } => {
            debug!(command = %name, guild = %invocation.guild, "routing command");
            let reply = registry.execute(&ctx.commands, &name, &invocation).await;
            let _ = reply_tx.send(reply);
        }
        BusMessage::Autocomplete { name, guild, partial, reply_tx } => {
            let reply = registry.autocomplete(&ctx.commands, &name, guild, &partial).await;
            let _ = reply_tx.send(reply);
        }
        BusMessage::GuildAvailable { id, name } => {
            if let Some(sandbox) = &ctx.sandbox {
                sandbox.add_guild(id);
            }
            if let Err(e) = ctx.commands.service.repository().ensure_guild(id, &name).await {
                warn!(guild = %id, error = %e, "could not register guild");
            }
        }
    }
}
