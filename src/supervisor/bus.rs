//! Supervisor event bus: one `mpsc` stream of typed messages from the intake
//! channels, with `oneshot` reply slots where the caller wants an answer.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::commands::{Choice, CommandError, Invocation};
use crate::model::GuildId;
use crate::semester::{DispatchOutcome, ReactionEvent};

pub type CommandReply = Result<String, CommandError>;
pub type AutocompleteReply = Result<Vec<Choice>, CommandError>;

#[derive(Debug)]
pub enum BusMessage {
    /// A reaction added to or removed from a message.
    Reaction {
        event: ReactionEvent,
        reply_tx: oneshot::Sender<DispatchOutcome>,
    },
    Command {
        name: String,
        invocation: Invocation,
        reply_tx: oneshot::Sender<CommandReply>,
    },
    Autocomplete {
        name: String,
        guild: GuildId,
        partial: String,
        reply_tx: oneshot::Sender<AutocompleteReply>,
    },
    /// The bot can see this guild; make sure it has a record.
    GuildAvailable { id: GuildId, name: String },
}

/// Call-level transport errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BusCallError {
    #[error("bus send failed: supervisor is not running")]
    Send,
    #[error("bus recv failed: supervisor dropped reply sender")]
    Recv,
}

/// Cloneable sender handed to intake channels.
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<BusMessage>,
}

impl BusHandle {
    pub fn new(tx: mpsc::Sender<BusMessage>) -> Self {
        Self { tx }
    }

    async fn send(&self, msg: BusMessage) -> Result<(), BusCallError> {
        self.tx.send(msg).await.map_err(|_| BusCallError::Send)
    }

    /// Submit a reaction and wait for the dispatcher's verdict.
    pub async fn reaction(&self, event: ReactionEvent) -> Result<DispatchOutcome, BusCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BusMessage::Reaction { event, reply_tx }).await?;
        reply_rx.await.map_err(|_| BusCallError::Recv)
    }

    pub async fn command(&self, name: &str, invocation: Invocation) -> Result<CommandReply, BusCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BusMessage::Command { name: name.to_string(), invocation, reply_tx }).await?;
        reply_rx.await.map_err(|_| BusCallError::Recv)
    }

    pub async fn autocomplete(
        &self,
        name: &str,
        guild: GuildId,
        partial: &str,
    ) -> Result<AutocompleteReply, BusCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(BusMessage::Autocomplete {
            name: name.to_string(),
            guild,
            partial: partial.to_string(),
            reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| BusCallError::Recv)
    }

    pub async fn guild_available(&self, id: GuildId, name: &str) -> Result<(), BusCallError> {
        self.send(BusMessage::GuildAvailable { id, name: name.to_string() }).await
    }
}

/// Owns the supervisor-side receiver.
pub struct SupervisorBus {
    pub rx: mpsc::Receiver<BusMessage>,
    pub handle: BusHandle,
}

impl SupervisorBus {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self { rx, handle: BusHandle::new(tx) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageId, UserId};
    use crate::semester::{DiscardReason, ReactionKind};

    fn event() -> ReactionEvent {
        ReactionEvent {
            kind: ReactionKind::Added,
            guild_id: GuildId(1),
            message_id: MessageId(2),
            user_id: UserId(3),
            emoji: "🍎".into(),
        }
    }

    #[tokio::test]
    async fn closed_bus_reports_send_error() {
        let bus = SupervisorBus::new(1);
        let handle = bus.handle.clone();
        drop(bus);
        assert_eq!(handle.guild_available(GuildId(1), "x").await, Err(BusCallError::Send));
        assert_eq!(handle.reaction(event()).await, Err(BusCallError::Send));
    }

    #[tokio::test]
    async fn reaction_waits_for_the_outcome() {
        let mut bus = SupervisorBus::new(1);
        let handle = bus.handle.clone();
        let call = tokio::spawn(async move { handle.reaction(event()).await });
        match bus.rx.recv().await {
            Some(BusMessage::Reaction { event, reply_tx }) => {
                assert_eq!(event.emoji, "🍎");
                reply_tx.send(DispatchOutcome::Discarded(DiscardReason::OtherMessage)).unwrap();
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(
            call.await.unwrap(),
            Ok(DispatchOutcome::Discarded(DiscardReason::OtherMessage))
        );
    }

    #[tokio::test]
    async fn dropped_reply_is_recv_error() {
        let mut bus = SupervisorBus::new(4);
        let handle = bus.handle.clone();
        let call = tokio::spawn(async move { handle.command("help", Invocation::new(GuildId(1), vec![])).await });
        match bus.rx.recv().await {
            Some(BusMessage::Command { reply_tx, .. }) => drop(reply_tx),
            other => panic!("unexpected message: {other:?}"),
        }
        assert_eq!(call.await.unwrap(), Err(BusCallError::Recv));
    }
}
