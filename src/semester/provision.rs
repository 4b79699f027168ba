//! Provisioning engine.
//!
//! Creates, in order: the text and voice categories, the landing channel,
//! one role plus private text/voice channel per group, the tracking message
//! and its reactions, and finally the guild record.  Everything created is
//! pushed onto a ledger; on any failure the ledger is unwound newest-first
//! and the original error is returned together with whatever could not be
//! removed.

use tracing::{debug, info, warn};

use super::{ROLE_MESSAGE_COLOR, ROLE_MESSAGE_TITLE, Reprovision, SemesterService, call};
use crate::error::{CourseError, ProvisionError};
use crate::model::{ChannelId, Group, GuildId, MessageId, RoleId};
use crate::platform::{ChannelKind, ChannelSpec, Embed, Overwrite, Permissions};

/// Filler for embed field values, which the platform rejects when empty.
const BLANK_FIELD: &str = "\u{200b}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub guild: GuildId,
    pub groups: Vec<Group>,
    pub role_message: MessageId,
    pub landing_channel: ChannelId,
    pub text_category: ChannelId,
    pub voice_category: ChannelId,
}

#[derive(Debug, Clone, Copy)]
enum Created {
    Channel(ChannelId),
    Role(RoleId),
}

#[derive(Default)]
struct Ledger {
    entries: Vec<(Created, String)>,
}

impl Ledger {
    fn channel(&mut self, id: ChannelId, name: &str) -> ChannelId {
        self.entries.push((Created::Channel(id), name.to_string()));
        id
    }

    fn role(&mut self, id: RoleId, name: &str) -> RoleId {
        self.entries.push((Created::Role(id), name.to_string()));
        id
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn everyone(guild: GuildId) -> RoleId {
    // The default role shares the guild's id.
    RoleId(guild.get())
}

impl SemesterService {
    /// Provision `count` groups on `guild`.
    pub async fn provision(&self, guild: GuildId, count: usize) -> Result<Provisioned, ProvisionError> {
        let max = self.settings.max_groups.min(super::MAX_GROUPS);
        if count == 0 || count > max {
            return Err(CourseError::InvalidGroupCount { requested: count, max }.into());
        }
        let existing = self.repo.load(guild).await.map_err(CourseError::from)?;
        if let Some(record) = &existing
            && record.is_active()
        {
            match self.settings.reprovision {
                Reprovision::Reject => return Err(CourseError::SemesterActive(guild.get()).into()),
                Reprovision::Parallel => {
                    warn!(%guild, groups = record.groups.len(), "provisioning alongside an active semester")
                }
            }
        }
        let emojis = self.draw_emojis(count)?;

        let mut ledger = Ledger::default();
        match self.build(guild, emojis, &mut ledger).await {
            Ok(done) => {
                info!(
                    %guild,
                    groups = done.groups.len(),
                    message = %done.role_message,
                    "semester provisioned"
                );
                Ok(done)
            }
            Err(cause) => {
                warn!(%guild, error = %cause, created = ledger.len(), "provisioning failed, rolling back");
                let compensation_failures = self.compensate(guild, ledger).await;
                if !compensation_failures.is_empty() {
                    warn!(%guild, left = compensation_failures.len(), "rollback incomplete");
                }
                Err(ProvisionError { cause, compensation_failures })
            }
        }
    }

    async fn build(
        &self,
        guild: GuildId,
        emojis: Vec<String>,
        ledger: &mut Ledger,
    ) -> Result<Provisioned, CourseError> {
        let t = self.timeout();
        let p = &self.platform;
        let s = &self.settings;

        let text_category = ledger.channel(
            call("create_category", t, p.create_category(guild, &s.text_category)).await?,
            &s.text_category,
        );
        let voice_category = ledger.channel(
            call("create_category", t, p.create_category(guild, &s.voice_category)).await?,
            &s.voice_category,
        );

        let landing = ChannelSpec {
            name: s.landing_channel.clone(),
            kind: ChannelKind::Text,
            parent: Some(text_category),
            overwrites: vec![
                Overwrite::role(
                    everyone(guild),
                    Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY | Permissions::ADD_REACTIONS,
                    Permissions::SEND_MESSAGES,
                ),
                Overwrite::member(
                    self.bot_user,
                    Permissions::SEND_MESSAGES | Permissions::ADD_REACTIONS,
                    Permissions::NONE,
                ),
            ],
        };
        let landing_channel = ledger.channel(
            call("create_channel", t, p.create_channel(guild, landing)).await?,
            &s.landing_channel,
        );

        let mut groups = Vec::with_capacity(emojis.len());
        for (i, emoji) in emojis.into_iter().enumerate() {
            let mut group = Group::numbered(i + 1, emoji);
            let role = ledger.role(
                call("create_role", t, p.create_role(guild, &group.name)).await?,
                &group.name,
            );
            group.role_id = Some(role);

            let text = group_channel(guild, &group.name, ChannelKind::Text, text_category, role);
            ledger.channel(call("create_channel", t, p.create_channel(guild, text)).await?, &group.name);
            let voice = group_channel(guild, &group.name, ChannelKind::Voice, voice_category, role);
            ledger.channel(call("create_channel", t, p.create_channel(guild, voice)).await?, &group.name);

            debug!(%guild, group = %group.name, emoji = %group.emoji, %role, "group created");
            groups.push(group);
        }

        let embed = groups
            .iter()
            .fold(Embed::new(ROLE_MESSAGE_TITLE).color(ROLE_MESSAGE_COLOR), |e, g| {
                e.field(g.label(), BLANK_FIELD, false)
            });
        // The message lives in the landing channel and goes with it on rollback.
        let role_message = call("send_embed", t, p.send_embed(landing_channel, embed)).await?;
        for group in &groups {
            call("add_reaction", t, p.add_reaction(landing_channel, role_message, &group.emoji)).await?;
        }

        self.repo.set_semester(guild, groups.clone(), role_message).await?;

        Ok(Provisioned {
            guild,
            groups,
            role_message,
            landing_channel,
            text_category,
            voice_category,
        })
    }

    /// Delete ledger entries newest-first.  Failures are collected, not raised.
    async fn compensate(&self, guild: GuildId, ledger: Ledger) -> Vec<CourseError> {
        let t = self.timeout();
        let mut failures = Vec::new();
        for (created, name) in ledger.entries.into_iter().rev() {
            let result = match created {
                Created::Channel(id) => call("delete_channel", t, self.platform.delete_channel(id)).await,
                Created::Role(id) => call("delete_role", t, self.platform.delete_role(guild, id)).await,
            };
            match result {
                Ok(()) => debug!(%guild, resource = %name, "rolled back"),
                Err(e) => {
                    warn!(%guild, resource = %name, error = %e, "rollback step failed");
                    failures.push(e);
                }
            }
        }
        failures
    }
}

fn group_channel(
    guild: GuildId,
    name: &str,
    kind: ChannelKind,
    parent: ChannelId,
    role: RoleId,
) -> ChannelSpec {
    let allow = match kind {
        ChannelKind::Voice => {
            Permissions::VIEW_CHANNEL | Permissions::CONNECT | Permissions::SPEAK | Permissions::STREAM
        }
        _ => Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES | Permissions::READ_MESSAGE_HISTORY,
    };
    ChannelSpec {
        name: name.to_string(),
        kind,
        parent: Some(parent),
        overwrites: vec![
            Overwrite::role(everyone(guild), Permissions::NONE, Permissions::VIEW_CHANNEL),
            Overwrite::role(role, allow, Permissions::NONE),
        ],
    }
}
