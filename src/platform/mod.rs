//! Platform gateway: the chat platform operations the bot depends on.
//!
//! The engines only ever talk to a `dyn Platform`.  Two implementations ship:
//!
//! * [`sandbox::SandboxPlatform`]: in-memory guild state with a call journal
//!   and failure injection.  Used by tests and `platform.kind = "sandbox"`.
//! * [`discord::DiscordPlatform`]: Discord REST v10 over `reqwest`.

pub mod discord;
pub mod permissions;
pub mod sandbox;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::{PlatformConfig, PlatformKind};
use crate::error::AppError;
use crate::model::{ChannelId, GuildId, MessageId, RoleId, UserId};

pub use discord::DiscordPlatform;
pub use permissions::Permissions;
pub use sandbox::SandboxPlatform;

#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("rate limited, retry after {retry_after_ms} ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out")]
    Timeout,
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl Overwrite {
    pub fn role(role: RoleId, allow: Permissions, deny: Permissions) -> Self {
        Self { target: OverwriteTarget::Role(role), allow, deny }
    }

    pub fn member(user: UserId, allow: Permissions, deny: Permissions) -> Self {
        Self { target: OverwriteTarget::Member(user), allow, deny }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
    pub overwrites: Vec<Overwrite>,
}

/// Partial channel update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdit {
    pub name: Option<String>,
    pub parent: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent: Option<ChannelId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// A structured message body: title plus labelled fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Embed {
    pub title: String,
    pub color: Option<u32>,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    pub fn color(mut self, color: u32) -> Self {
        self.color = Some(color);
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField { name: name.into(), value: value.into(), inline });
        self
    }
}

/// Chat platform operations.  Every call is a suspension point and may fail.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user.
    async fn current_user(&self) -> Result<UserId, PlatformError>;

    async fn create_category(&self, guild: GuildId, name: &str) -> Result<ChannelId, PlatformError>;

    async fn create_channel(&self, guild: GuildId, spec: ChannelSpec) -> Result<ChannelId, PlatformError>;

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> Result<(), PlatformError>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError>;

    async fn channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>, PlatformError>;

    async fn create_role(&self, guild: GuildId, name: &str) -> Result<RoleId, PlatformError>;

    async fn rename_role(&self, guild: GuildId, role: RoleId, name: &str) -> Result<(), PlatformError>;

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<(), PlatformError>;

    async fn roles(&self, guild: GuildId) -> Result<Vec<RoleInfo>, PlatformError>;

    async fn role_members(&self, guild: GuildId, role: RoleId) -> Result<Vec<UserId>, PlatformError>;

    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError>;

    /// Granting an already-held role is not an error.
    async fn add_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Revoking an unheld role is not an error.
    async fn remove_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    async fn send_embed(&self, channel: ChannelId, embed: Embed) -> Result<MessageId, PlatformError>;

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), PlatformError>;
}

// ── Factory ───────────────────────────────────────────────────────────────────

/// The platform selected by `[platform].kind`.  `sandbox` is set only for
/// the in-memory platform so intake channels can seed guilds and members.
#[derive(Clone)]
pub struct Connected {
    pub platform: Arc<dyn Platform>,
    pub sandbox: Option<Arc<SandboxPlatform>>,
}

impl Connected {
    pub fn kind(&self) -> &'static str {
        if self.sandbox.is_some() { "sandbox" } else { "discord" }
    }
}

/// Build the configured platform.  Discord needs `token`.
pub fn build(config: &PlatformConfig, token: Option<&str>) -> Result<Connected, AppError> {
    match config.kind {
        PlatformKind::Sandbox => {
            let sandbox = Arc::new(SandboxPlatform::new(UserId(config.sandbox_bot_user)));
            for g in &config.guilds {
                sandbox.add_guild(GuildId(g.id));
            }
            info!(guilds = config.guilds.len(), "sandbox platform ready");
            Ok(Connected { platform: sandbox.clone(), sandbox: Some(sandbox) })
        }
        PlatformKind::Discord => {
            let token = token
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AppError::Config("DISCORD_TOKEN is required for platform.kind = \"discord\"".into()))?;
            let discord = DiscordPlatform::new(&config.api_base_url, token.to_string(), config.call_timeout)?;
            info!(api = %config.api_base_url, "discord platform ready");
            Ok(Connected { platform: Arc::new(discord), sandbox: None })
        }
    }
}
