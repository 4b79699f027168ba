//! In-memory platform with a call journal and failure injection.
//!
//! Every trait call is appended to the journal *before* it runs, including
//! calls that fail, so tests can assert on exact call sequences.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{
    ChannelEdit, ChannelInfo, ChannelKind, ChannelSpec, Embed, Overwrite, Platform, PlatformError,
    RoleInfo,
};
use crate::model::{ChannelId, GuildId, MessageId, RoleId, UserId};

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone)]
struct ChannelRecord {
    guild: GuildId,
    name: String,
    kind: ChannelKind,
    parent: Option<ChannelId>,
    overwrites: Vec<Overwrite>,
}

#[derive(Debug, Clone)]
pub struct SandboxMessage {
    pub channel: ChannelId,
    pub embed: Embed,
    /// emoji -> users, in reaction order.
    pub reactions: BTreeMap<String, Vec<UserId>>,
}

#[derive(Debug, Default)]
struct GuildState {
    roles: BTreeMap<RoleId, String>,
    members: HashMap<UserId, HashSet<RoleId>>,
}

struct FailRule {
    /// 1-based call index of the op that fails.
    nth: usize,
    error: PlatformError,
}

#[derive(Default)]
struct State {
    guilds: HashMap<GuildId, GuildState>,
    channels: BTreeMap<ChannelId, ChannelRecord>,
    messages: HashMap<MessageId, SandboxMessage>,
    journal: Vec<Call>,
    op_counts: HashMap<&'static str, usize>,
    failures: HashMap<&'static str, FailRule>,
}

pub struct SandboxPlatform {
    bot_user: UserId,
    next_id: AtomicU64,
    state: Mutex<State>,
}

impl SandboxPlatform {
    pub fn new(bot_user: UserId) -> Self {
        Self {
            bot_user,
            next_id: AtomicU64::new(1_000),
            state: Mutex::new(State::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned sandbox only happens after a test panicked mid-call.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Record the call and apply any matching failure rule.
    fn enter(&self, op: &'static str, detail: String) -> Result<std::sync::MutexGuard<'_, State>, PlatformError> {
        let mut st = self.lock();
        st.journal.push(Call { op, detail });
        let count = {
            let c = st.op_counts.entry(op).or_default();
            *c += 1;
            *c
        };
        if st.failures.get(op).is_some_and(|rule| rule.nth == count) {
            if let Some(rule) = st.failures.remove(op) {
                return Err(rule.error);
            }
        }
        Ok(st)
    }

    // ── Test / setup helpers ──────────────────────────────────────────

    /// Register a guild.  The `@everyone` role shares the guild's id.
    pub fn add_guild(&self, guild: GuildId) {
        let mut st = self.lock();
        let g = st.guilds.entry(guild).or_default();
        g.roles.insert(RoleId(guild.get()), "@everyone".to_string());
    }

    pub fn add_member(&self, guild: GuildId, user: UserId) {
        let mut st = self.lock();
        st.guilds.entry(guild).or_default().members.entry(user).or_default();
    }

    /// Seed a role without journaling it.
    pub fn seed_role(&self, guild: GuildId, name: &str) -> RoleId {
        let id = RoleId(self.next_id());
        self.lock().guilds.entry(guild).or_default().roles.insert(id, name.to_string());
        id
    }

    /// Make the `nth` (1-based, counted from now) call of `op` fail.
    pub fn fail_on_nth(&self, op: &'static str, nth: usize, error: PlatformError) {
        let mut st = self.lock();
        let already = st.op_counts.get(op).copied().unwrap_or(0);
        st.failures.insert(op, FailRule { nth: already + nth, error });
    }

    /// Make the next call of `op` fail.
    pub fn fail_next(&self, op: &'static str, error: PlatformError) {
        self.fail_on_nth(op, 1, error);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().journal.clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.lock().journal.iter().map(|c| c.op).collect()
    }

    pub fn clear_journal(&self) {
        self.lock().journal.clear();
    }

    pub fn role_named(&self, guild: GuildId, name: &str) -> Option<RoleId> {
        let st = self.lock();
        st.guilds
            .get(&guild)?
            .roles
            .iter()
            .find(|(_, n)| n.as_str() == name)
            .map(|(id, _)| *id)
    }

    pub fn role_count(&self, guild: GuildId) -> usize {
        // @everyone is not a created resource.
        self.lock().guilds.get(&guild).map_or(0, |g| g.roles.len().saturating_sub(1))
    }

    pub fn channel_named(&self, guild: GuildId, name: &str, kind: ChannelKind) -> Option<ChannelInfo> {
        let st = self.lock();
        st.channels
            .iter()
            .find(|(_, c)| c.guild == guild && c.name == name && c.kind == kind)
            .map(|(id, c)| info(*id, c))
    }

    pub fn channel_count(&self, guild: GuildId) -> usize {
        self.lock().channels.values().filter(|c| c.guild == guild).count()
    }

    pub fn channel_overwrites(&self, channel: ChannelId) -> Vec<Overwrite> {
        self.lock().channels.get(&channel).map(|c| c.overwrites.clone()).unwrap_or_default()
    }

    pub fn member_has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> bool {
        self.lock()
            .guilds
            .get(&guild)
            .and_then(|g| g.members.get(&user))
            .is_some_and(|roles| roles.contains(&role))
    }

    pub fn message(&self, message: MessageId) -> Option<SandboxMessage> {
        self.lock().messages.get(&message).cloned()
    }
}

fn info(id: ChannelId, c: &ChannelRecord) -> ChannelInfo {
    ChannelInfo { id, name: c.name.clone(), kind: c.kind, parent: c.parent }
}

fn unknown_guild(guild: GuildId) -> PlatformError {
    PlatformError::NotFound(format!("guild {guild}"))
}

#[async_trait]
impl Platform for SandboxPlatform {
    async fn current_user(&self) -> Result<UserId, PlatformError> {
        let _st = self.enter("current_user", String::new())?;
        Ok(self.bot_user)
    }

    async fn create_category(&self, guild: GuildId, name: &str) -> Result<ChannelId, PlatformError> {
        let mut st = self.enter("create_category", name.to_string())?;
        if !st.guilds.contains_key(&guild) {
            return Err(unknown_guild(guild));
        }
        let id = ChannelId(self.next_id());
        st.channels.insert(id, ChannelRecord {
            guild,
            name: name.to_string(),
            kind: ChannelKind::Category,
            parent: None,
            overwrites: Vec::new(),
        });
        Ok(id)
    }

    async fn create_channel(&self, guild: GuildId, spec: ChannelSpec) -> Result<ChannelId, PlatformError> {
        let mut st = self.enter("create_channel", spec.name.clone())?;
        if !st.guilds.contains_key(&guild) {
            return Err(unknown_guild(guild));
        }
        if let Some(parent) = spec.parent
            && !st.channels.contains_key(&parent)
        {
            return Err(PlatformError::NotFound(format!("parent channel {parent}")));
        }
        let id = ChannelId(self.next_id());
        st.channels.insert(id, ChannelRecord {
            guild,
            name: spec.name,
            kind: spec.kind,
            parent: spec.parent,
            overwrites: spec.overwrites,
        });
        Ok(id)
    }

    async fn edit_channel(&self, channel: ChannelId, edit: ChannelEdit) -> Result<(), PlatformError> {
        let mut st = self.enter("edit_channel", channel.to_string())?;
        let record = st
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel}")))?;
        if let Some(name) = edit.name {
            record.name = name;
        }
        if let Some(parent) = edit.parent {
            record.parent = Some(parent);
        }
        Ok(())
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        let mut st = self.enter("delete_channel", channel.to_string())?;
        if st.channels.remove(&channel).is_none() {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        for c in st.channels.values_mut() {
            if c.parent == Some(channel) {
                c.parent = None;
            }
        }
        st.messages.retain(|_, m| m.channel != channel);
        Ok(())
    }

    async fn channels(&self, guild: GuildId) -> Result<Vec<ChannelInfo>, PlatformError> {
        let st = self.enter("channels", guild.to_string())?;
        Ok(st
            .channels
            .iter()
            .filter(|(_, c)| c.guild == guild)
            .map(|(id, c)| info(*id, c))
            .collect())
    }

    async fn create_role(&self, guild: GuildId, name: &str) -> Result<RoleId, PlatformError> {
        let mut st = self.enter("create_role", name.to_string())?;
        let id = RoleId(self.next_id());
        st.guilds
            .get_mut(&guild)
            .ok_or_else(|| unknown_guild(guild))?
            .roles
            .insert(id, name.to_string());
        Ok(id)
    }

    async fn rename_role(&self, guild: GuildId, role: RoleId, name: &str) -> Result<(), PlatformError> {
        let mut st = self.enter("rename_role", format!("{role} -> {name}"))?;
        let slot = st
            .guilds
            .get_mut(&guild)
            .and_then(|g| g.roles.get_mut(&role))
            .ok_or_else(|| PlatformError::NotFound(format!("role {role}")))?;
        *slot = name.to_string();
        Ok(())
    }

    async fn delete_role(&self, guild: GuildId, role: RoleId) -> Result<(), PlatformError> {
        let mut st = self.enter("delete_role", role.to_string())?;
        let g = st.guilds.get_mut(&guild).ok_or_else(|| unknown_guild(guild))?;
        if g.roles.remove(&role).is_none() {
            return Err(PlatformError::NotFound(format!("role {role}")));
        }
        for roles in g.members.values_mut() {
            roles.remove(&role);
        }
        Ok(())
    }

    async fn roles(&self, guild: GuildId) -> Result<Vec<RoleInfo>, PlatformError> {
        let st = self.enter("roles", guild.to_string())?;
        let g = st.guilds.get(&guild).ok_or_else(|| unknown_guild(guild))?;
        Ok(g.roles.iter().map(|(id, name)| RoleInfo { id: *id, name: name.clone() }).collect())
    }

    async fn role_members(&self, guild: GuildId, role: RoleId) -> Result<Vec<UserId>, PlatformError> {
        let st = self.enter("role_members", role.to_string())?;
        let g = st.guilds.get(&guild).ok_or_else(|| unknown_guild(guild))?;
        let mut users: Vec<UserId> = g
            .members
            .iter()
            .filter(|(_, roles)| roles.contains(&role))
            .map(|(u, _)| *u)
            .collect();
        users.sort();
        Ok(users)
    }

    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleId>, PlatformError> {
        let st = self.enter("member_roles", user.to_string())?;
        let g = st.guilds.get(&guild).ok_or_else(|| unknown_guild(guild))?;
        let roles = g
            .members
            .get(&user)
            .ok_or_else(|| PlatformError::NotFound(format!("member {user}")))?;
        let mut roles: Vec<RoleId> = roles.iter().copied().collect();
        roles.sort();
        Ok(roles)
    }

    async fn add_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut st = self.enter("add_member_role", format!("{user} +{role}"))?;
        let g = st.guilds.get_mut(&guild).ok_or_else(|| unknown_guild(guild))?;
        if !g.roles.contains_key(&role) {
            return Err(PlatformError::NotFound(format!("role {role}")));
        }
        g.members
            .get_mut(&user)
            .ok_or_else(|| PlatformError::NotFound(format!("member {user}")))?
            .insert(role);
        Ok(())
    }

    async fn remove_member_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut st = self.enter("remove_member_role", format!("{user} -{role}"))?;
        let g = st.guilds.get_mut(&guild).ok_or_else(|| unknown_guild(guild))?;
        g.members
            .get_mut(&user)
            .ok_or_else(|| PlatformError::NotFound(format!("member {user}")))?
            .remove(&role);
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: Embed) -> Result<MessageId, PlatformError> {
        let mut st = self.enter("send_embed", embed.title.clone())?;
        if !st.channels.contains_key(&channel) {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        let id = MessageId(self.next_id());
        st.messages.insert(id, SandboxMessage { channel, embed, reactions: BTreeMap::new() });
        Ok(id)
    }

    async fn add_reaction(&self, channel: ChannelId, message: MessageId, emoji: &str) -> Result<(), PlatformError> {
        let mut st = self.enter("add_reaction", emoji.to_string())?;
        let bot = self.bot_user;
        let msg = st
            .messages
            .get_mut(&message)
            .filter(|m| m.channel == channel)
            .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))?;
        let users = msg.reactions.entry(emoji.to_string()).or_default();
        if !users.contains(&bot) {
            users.push(bot);
        }
        Ok(())
    }
}
