//! Operator commands.
//!
//! A static table of [`Command`]s keyed by name.  Every command is
//! administrator-only: the intake channel sets [`Invocation::admin`] and the
//! registry refuses the call before the command runs when it is unset.

mod canvas;
mod help;
mod semester;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::canvas::CourseDirectory;
use crate::model::GuildId;
use crate::semester::SemesterService;

pub use canvas::{CanvasAddCourse, CanvasCourses};
pub use help::Help;
pub use semester::{EndSemester, StartSemester};

/// Most suggestions a single autocomplete request returns.
pub const MAX_CHOICES: usize = 25;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(String),

    #[error("`{0}` requires administrator permission")]
    Forbidden(String),

    #[error("{0}")]
    Failed(String),
}

/// One call of a command from an intake channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub guild: GuildId,
    #[serde(default)]
    pub args: Vec<String>,
    /// Whether the caller holds the administrator permission.
    #[serde(default)]
    pub admin: bool,
}

impl Invocation {
    pub fn new(guild: GuildId, args: Vec<String>) -> Self {
        Self { guild, args, admin: true }
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

/// An autocomplete suggestion: a display name and the value to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

/// Services commands may use.
#[derive(Clone)]
pub struct CommandContext {
    pub service: Arc<SemesterService>,
    /// `None` when Canvas is not configured.
    pub canvas: Option<Arc<dyn CourseDirectory>>,
}

#[async_trait]
pub trait Command: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Argument synopsis, e.g. `"<n>"`.
    fn usage(&self) -> &'static str {
        ""
    }

    /// Run the command and return the reply text.
    async fn execute(&self, ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError>;

    /// Suggestions for a partially typed argument.
    async fn autocomplete(&self, _ctx: &CommandContext, _guild: GuildId, _partial: &str) -> Vec<Choice> {
        Vec::new()
    }

    fn usage_error(&self) -> CommandError {
        CommandError::Usage(format!("{} {}", self.name(), self.usage()).trim_end().to_string())
    }
}

/// Name and one-line help for a registered command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
}

impl CommandSummary {
    fn of(cmd: &dyn Command) -> Self {
        Self { name: cmd.name(), usage: cmd.usage(), description: cmd.description() }
    }
}

pub struct CommandRegistry {
    commands: BTreeMap<&'static str, Box<dyn Command>>,
}

impl CommandRegistry {
    /// # Panics
    ///
    /// Panics if two commands share a name.
    pub fn new(commands: Vec<Box<dyn Command>>) -> Self {
        let mut table = BTreeMap::new();
        for cmd in commands {
            let name = cmd.name();
            if table.insert(name, cmd).is_some() {
                panic!("duplicate command registered: {name:?}");
            }
        }
        Self { commands: table }
    }

    /// The built-in command set, including `help`.
    pub fn builtin() -> Self {
        let mut commands: Vec<Box<dyn Command>> = vec![
            Box::new(StartSemester),
            Box::new(EndSemester),
            Box::new(CanvasAddCourse),
            Box::new(CanvasCourses),
        ];
        let mut summaries: Vec<CommandSummary> = commands.iter().map(|c| CommandSummary::of(c.as_ref())).collect();
        let help = Help::new(Vec::new());
        summaries.push(CommandSummary::of(&help));
        summaries.sort_by_key(|s| s.name);
        commands.push(Box::new(Help::new(summaries)));
        Self::new(commands)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.commands.keys().copied().collect()
    }

    pub fn summaries(&self) -> Vec<CommandSummary> {
        self.commands.values().map(|c| CommandSummary::of(c.as_ref())).collect()
    }

    pub async fn execute(
        &self,
        ctx: &CommandContext,
        name: &str,
        invocation: &Invocation,
    ) -> Result<String, CommandError> {
        let cmd = self.commands.get(name).ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        if !invocation.admin {
            warn!(command = name, guild = %invocation.guild, "command refused: not an administrator");
            return Err(CommandError::Forbidden(name.to_string()));
        }
        debug!(command = name, guild = %invocation.guild, args = ?invocation.args, "running command");
        let result = cmd.execute(ctx, invocation).await;
        match &result {
            Ok(_) => info!(command = name, guild = %invocation.guild, "command completed"),
            Err(e) => warn!(command = name, guild = %invocation.guild, error = %e, "command failed"),
        }
        result
    }

    pub async fn autocomplete(
        &self,
        ctx: &CommandContext,
        name: &str,
        guild: GuildId,
        partial: &str,
    ) -> Result<Vec<Choice>, CommandError> {
        let cmd = self.commands.get(name).ok_or_else(|| CommandError::Unknown(name.to_string()))?;
        let mut choices = cmd.autocomplete(ctx, guild, partial).await;
        choices.truncate(MAX_CHOICES);
        Ok(choices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semester::testing::{GUILD, fixture};

    struct Echo;

    #[async_trait]
    impl Command for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "repeat the arguments"
        }

        async fn execute(&self, _ctx: &CommandContext, invocation: &Invocation) -> Result<String, CommandError> {
            Ok(invocation.args.join(" "))
        }
    }

    fn ctx() -> CommandContext {
        CommandContext { service: Arc::new(fixture().service), canvas: None }
    }

    #[test]
    #[should_panic(expected = "duplicate command")]
    fn duplicate_names_panic() {
        CommandRegistry::new(vec![Box::new(Echo), Box::new(Echo)]);
    }

    #[test]
    fn builtin_set_is_complete() {
        let reg = CommandRegistry::builtin();
        assert_eq!(
            reg.names(),
            vec!["canvas_add_course", "canvas_courses", "end_semester", "help", "start_semester"]
        );
    }

    #[tokio::test]
    async fn non_admins_are_refused() {
        let reg = CommandRegistry::new(vec![Box::new(Echo)]);
        let mut inv = Invocation::new(GUILD, vec!["hi".into()]);
        assert_eq!(reg.execute(&ctx(), "echo", &inv).await.unwrap(), "hi");
        inv.admin = false;
        assert_eq!(
            reg.execute(&ctx(), "echo", &inv).await,
            Err(CommandError::Forbidden("echo".into()))
        );
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let reg = CommandRegistry::new(vec![Box::new(Echo)]);
        let inv = Invocation::new(GUILD, vec![]);
        assert_eq!(
            reg.execute(&ctx(), "nope", &inv).await,
            Err(CommandError::Unknown("nope".into()))
        );
        assert!(reg.autocomplete(&ctx(), "nope", GUILD, "").await.is_err());
    }

    #[test]
    fn invocation_defaults_admin_off_when_deserialized() {
        let inv: Invocation = serde_json::from_str(r#"{"guild": 5}"#).unwrap();
        assert!(!inv.admin);
        assert!(inv.args.is_empty());
    }
}
