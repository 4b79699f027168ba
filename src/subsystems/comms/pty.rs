//! PTY (console) channel: reads operator lines from stdin, forwards them to
//! the supervisor and prints the reply.
//!
//! ```text
//! /<command> <guild> [args...]                     run a command as administrator
//! /complete <command> <guild> [partial]            autocomplete suggestions
//! /react add|remove <guild> <message> <user> <emoji>
//! /guild <id> [name]                               register a guild
//! /help                                            list commands
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::{CommsEvent, CommsState};
use crate::commands::Invocation;
use crate::error::AppError;
use crate::model::{GuildId, MessageId, UserId};
use crate::semester::{DispatchOutcome, ReactionEvent, ReactionKind};
use crate::subsystems::runtime::{Component, ComponentFuture};

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command { name: String, invocation: Invocation },
    Complete { name: String, guild: GuildId, partial: String },
    Reaction(ReactionEvent),
    Guild { id: GuildId, name: String },
}

fn parse_id<T: std::str::FromStr>(raw: Option<&str>, what: &str) -> Result<T, String> {
    raw.ok_or_else(|| format!("missing {what}"))?
        .parse::<T>()
        .map_err(|_| format!("invalid {what}"))
}

/// Parse a console line.  `Err` carries a message for the operator.
pub fn parse_line(line: &str) -> Result<ConsoleInput, String> {
    let Some(body) = line.trim().strip_prefix('/') else {
        return Err("commands start with '/'; try /help".into());
    };
    let mut words = body.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command; try /help".into());
    };

    match head {
        "help" => Ok(ConsoleInput::Command {
            name: "help".into(),
            invocation: Invocation::new(GuildId(0), Vec::new()),
        }),
        "react" => {
            let kind = match words.next() {
                Some("add") => ReactionKind::Added,
                Some("remove") => ReactionKind::Removed,
                _ => return Err("usage: /react add|remove <guild> <message> <user> <emoji>".into()),
            };
            let guild_id: GuildId = parse_id(words.next(), "guild id")?;
            let message_id: MessageId = parse_id(words.next(), "message id")?;
            let user_id: UserId = parse_id(words.next(), "user id")?;
            let emoji = words.next().ok_or("missing emoji")?.to_string();
            Ok(ConsoleInput::Reaction(ReactionEvent { kind, guild_id, message_id, user_id, emoji }))
        }
        "guild" => {
            let id: GuildId = parse_id(words.next(), "guild id")?;
            let name = words.collect::<Vec<_>>().join(" ");
            Ok(ConsoleInput::Guild { id, name })
        }
        "complete" => {
            let name = words.next().ok_or("usage: /complete <command> <guild> [partial]")?.to_string();
            let guild: GuildId = parse_id(words.next(), "guild id")?;
            let partial = words.collect::<Vec<_>>().join(" ");
            Ok(ConsoleInput::Complete { name, guild, partial })
        }
        name => {
            let guild: GuildId = parse_id(words.next(), "guild id")?;
            let args = words.map(str::to_string).collect();
            Ok(ConsoleInput::Command { name: name.to_string(), invocation: Invocation::new(guild, args) })
        }
    }
}

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Granted { group, role } => format!("granted {group} (role {role})"),
        DispatchOutcome::Revoked { group, role } => format!("revoked {group} (role {role})"),
        DispatchOutcome::Discarded(reason) => format!("ignored: {reason}"),
    }
}

/// Run one parsed line against the supervisor and render the reply.
pub async fn handle(state: &CommsState, input: ConsoleInput) -> Result<String, AppError> {
    Ok(match input {
        ConsoleInput::Command { name, invocation } => match state.run_command(&name, invocation).await? {
            Ok(reply) => reply,
            Err(e) => format!("error: {e}"),
        },
        ConsoleInput::Complete { name, guild, partial } => match state.autocomplete(&name, guild, &partial).await? {
            Ok(choices) if choices.is_empty() => "no suggestions".into(),
            Ok(choices) => choices
                .iter()
                .map(|c| format!("{}  {}", c.value, c.name))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => format!("error: {e}"),
        },
        ConsoleInput::Reaction(event) => describe(&state.submit_reaction(event).await?),
        ConsoleInput::Guild { id, name } => {
            state.register_guild(id, &name).await?;
            format!("guild {id} registered")
        }
    })
}

pub struct PtyChannel {
    channel_id: String,
    state: Arc<CommsState>,
}

impl PtyChannel {
    pub fn new(channel_id: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self { channel_id: channel_id.into(), state }
    }
}

impl Component for PtyChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_pty(self.channel_id, self.state, shutdown))
    }
}

async fn run_pty(channel_id: String, state: Arc<CommsState>, shutdown: CancellationToken) -> Result<(), AppError> {
    info!(%channel_id, "pty channel started");
    println!("─────────────────────────────────");
    println!(" {} console  (/help, Ctrl-C to quit)", state.info.bot_name);
    println!("─────────────────────────────────");
    state.report_event(CommsEvent::SessionStarted { channel_id: channel_id.clone() });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        use std::io::Write as _;
        let _ = std::io::stdout().flush();

        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                println!();
                info!("pty channel shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("pty read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("pty stdin closed");
                        break;
                    }
                    Ok(Some(input)) => {
                        if input.trim().is_empty() {
                            continue;
                        }
                        debug!(input = %input.trim(), "pty received line");
                        match parse_line(&input) {
                            Err(msg) => println!("{msg}"),
                            Ok(parsed) => match handle(&state, parsed).await {
                                Ok(reply) => println!("{reply}"),
                                Err(e) => {
                                    warn!("supervisor unreachable: {e}, pty exiting");
                                    break;
                                }
                            },
                        }
                    }
                }
            }
        }
    }

    state.report_event(CommsEvent::ChannelShutdown { channel_id });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_lines_carry_guild_and_args() {
        let parsed = parse_line("/start_semester 4242 3").unwrap();
        assert_eq!(
            parsed,
            ConsoleInput::Command {
                name: "start_semester".into(),
                invocation: Invocation::new(GuildId(4242), vec!["3".into()]),
            }
        );
    }

    #[test]
    fn react_lines_become_events() {
        let parsed = parse_line("/react remove 1 2 3 🍎").unwrap();
        assert_eq!(
            parsed,
            ConsoleInput::Reaction(ReactionEvent {
                kind: ReactionKind::Removed,
                guild_id: GuildId(1),
                message_id: MessageId(2),
                user_id: UserId(3),
                emoji: "🍎".into(),
            })
        );
        assert!(parse_line("/react poke 1 2 3 🍎").is_err());
        assert_eq!(parse_line("/react add 1 2 3").unwrap_err(), "missing emoji");
        assert_eq!(parse_line("/react add x 2 3 🍎").unwrap_err(), "invalid guild id");
    }

    #[test]
    fn guild_names_may_contain_spaces() {
        assert_eq!(
            parse_line("/guild 7 INF 1100 fall").unwrap(),
            ConsoleInput::Guild { id: GuildId(7), name: "INF 1100 fall".into() }
        );
    }

    #[test]
    fn complete_and_help() {
        assert_eq!(
            parse_line("/complete canvas_add_course 7 intro").unwrap(),
            ConsoleInput::Complete { name: "canvas_add_course".into(), guild: GuildId(7), partial: "intro".into() }
        );
        assert!(matches!(parse_line("/help").unwrap(), ConsoleInput::Command { name, .. } if name == "help"));
    }

    #[test]
    fn non_commands_are_rejected() {
        assert!(parse_line("hello").is_err());
        assert!(parse_line("/").is_err());
        assert_eq!(parse_line("/end_semester").unwrap_err(), "missing guild id");
    }
}
