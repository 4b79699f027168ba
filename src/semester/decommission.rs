//! Decommission engine: end a semester.
//!
//! Three phases, strictly ordered:
//!
//! 1. Grants: every member of every group role receives the alumni role.
//! 2. Teardown: each group's channels and role are archived or deleted,
//!    depending on [`ArchivePolicy`].  A group whose members could not all
//!    be granted alumni is left intact.
//! 3. The guild record forgets the torn-down groups.  Once no group is left,
//!    the tracking message is forgotten and the group categories and the
//!    landing channel are removed.
//!
//! Missing resources and per-resource platform failures are logged and
//! reported, never fatal.  Failing to read or write the guild record aborts.
//! Groups kept after a failed grant stay in the record, so running the
//! decommission again finishes them.

use chrono::Datelike;
use tracing::{debug, info, warn};

use super::{ArchivePolicy, SemesterService, call, group_role};
use crate::error::{CourseError, ResourceKind};
use crate::model::{ChannelId, Group, GuildId, RoleId};
use crate::platform::{ChannelEdit, ChannelInfo, ChannelKind};

#[derive(Debug, Default)]
pub struct Decommissioned {
    pub groups: usize,
    pub members_migrated: usize,
    pub policy: ArchivePolicy,
    /// Resources that were missing or could not be changed.
    pub skipped: Vec<CourseError>,
    /// Groups left in place because an alumni grant failed.
    pub retained: Vec<String>,
}

impl Decommissioned {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Semester ended: {} group(s), {} member(s) moved to alumni",
            self.groups, self.members_migrated
        );
        if !self.skipped.is_empty() {
            out.push_str(&format!(", {} resource(s) skipped", self.skipped.len()));
        }
        if !self.retained.is_empty() {
            out.push_str(&format!(
                "; kept {} until alumni grants succeed, run again to finish",
                self.retained.join(", ")
            ));
        }
        out
    }
}

/// A group after phase 1.
struct Granted<'a> {
    group: &'a Group,
    role: Option<RoleId>,
    /// Every member of the role now holds alumni.
    complete: bool,
}

fn find_channel<'a>(channels: &'a [ChannelInfo], name: &str, kind: ChannelKind) -> Option<&'a ChannelInfo> {
    channels.iter().find(|c| c.kind == kind && c.name == name)
}

impl SemesterService {
    pub async fn decommission(&self, guild: GuildId) -> Result<Decommissioned, CourseError> {
        self.decommission_in_year(guild, chrono::Local::now().year()).await
    }

    /// As [`decommission`](Self::decommission), with the year used for
    /// archive names supplied by the caller.
    pub async fn decommission_in_year(&self, guild: GuildId, year: i32) -> Result<Decommissioned, CourseError> {
        let policy = self.settings.archive_policy;
        let mut report = Decommissioned { policy, ..Decommissioned::default() };

        let groups = match self.repo.load(guild).await? {
            Some(record) if !record.groups.is_empty() => record.groups,
            _ => {
                self.repo.clear_semester(guild).await?;
                info!(%guild, "no active groups, nothing to decommission");
                return Ok(report);
            }
        };
        report.groups = groups.len();

        let t = self.timeout();
        let p = &self.platform;
        let s = &self.settings;

        // ── Phase 1: alumni grants ───────────────────────────────────────
        let roles = call("roles", t, p.roles(guild)).await?;
        let alumni = match roles.iter().find(|r| r.name == s.alumni_role) {
            Some(r) => r.id,
            None => {
                let id = call("create_role", t, p.create_role(guild, &s.alumni_role)).await?;
                info!(%guild, role = %s.alumni_role, "created alumni role");
                id
            }
        };

        let mut granted: Vec<Granted<'_>> = Vec::with_capacity(groups.len());
        for group in &groups {
            let Some(role_id) = group_role(&roles, group) else {
                report.skipped.push(missing(ResourceKind::Role, &group.name));
                granted.push(Granted { group, role: None, complete: true });
                continue;
            };

            let members = match call("role_members", t, p.role_members(guild, role_id)).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(%guild, group = %group.name, error = %e, "cannot list group members");
                    report.skipped.push(e);
                    granted.push(Granted { group, role: Some(role_id), complete: false });
                    continue;
                }
            };
            let mut complete = true;
            for user in members {
                match call("add_member_role", t, p.add_member_role(guild, user, alumni)).await {
                    Ok(()) => report.members_migrated += 1,
                    Err(e) => {
                        warn!(%guild, %user, error = %e, "alumni grant failed");
                        report.skipped.push(e);
                        complete = false;
                    }
                }
            }
            debug!(%guild, group = %group.name, complete, "grants done");
            granted.push(Granted { group, role: Some(role_id), complete });
        }

        // ── Phase 2: teardown ────────────────────────────────────────────
        let channels = call("channels", t, p.channels(guild)).await?;
        let mut archive: Option<ChannelId> = None;
        for Granted { group, role, complete } in granted {
            if !complete {
                warn!(%guild, group = %group.name, "alumni grants incomplete, group kept");
                report.retained.push(group.name.clone());
                continue;
            }

            let text = find_channel(&channels, &group.name, ChannelKind::Text).map(|c| c.id);
            let voice = find_channel(&channels, &group.name, ChannelKind::Voice).map(|c| c.id);

            match text {
                None => report.skipped.push(missing(ResourceKind::TextChannel, &group.name)),
                Some(id) => {
                    let outcome = match policy {
                        ArchivePolicy::Delete => call("delete_channel", t, p.delete_channel(id)).await,
                        ArchivePolicy::Archive => match self.archive_category(guild, &channels, &mut archive).await {
                            Ok(parent) => {
                                let edit = ChannelEdit {
                                    name: Some(format!("{year}_{}", group.name)),
                                    parent: Some(parent),
                                };
                                call("edit_channel", t, p.edit_channel(id, edit)).await
                            }
                            Err(e) => Err(e),
                        },
                    };
                    self.note(guild, &group.name, outcome, &mut report);
                }
            }

            match voice {
                None => report.skipped.push(missing(ResourceKind::VoiceChannel, &group.name)),
                Some(id) => {
                    let outcome = call("delete_channel", t, p.delete_channel(id)).await;
                    self.note(guild, &group.name, outcome, &mut report);
                }
            }

            if let Some(role) = role {
                let outcome = match policy {
                    ArchivePolicy::Delete => call("delete_role", t, p.delete_role(guild, role)).await,
                    ArchivePolicy::Archive => {
                        let name = format!("{}_{year}", group.name);
                        call("rename_role", t, p.rename_role(guild, role, &name)).await
                    }
                };
                self.note(guild, &group.name, outcome, &mut report);
            }
        }

        // ── Phase 3: forget the semester, drop the scaffolding ───────────
        if !report.retained.is_empty() {
            self.repo.retain_groups(guild, &report.retained).await?;
            info!(%guild, retained = ?report.retained, "semester partially decommissioned");
            return Ok(report);
        }
        self.repo.clear_semester(guild).await?;

        let scaffolding = [
            (s.text_category.as_str(), ChannelKind::Category, ResourceKind::Category),
            (s.voice_category.as_str(), ChannelKind::Category, ResourceKind::Category),
            (s.landing_channel.as_str(), ChannelKind::Text, ResourceKind::TextChannel),
        ];
        for (name, kind, resource) in scaffolding {
            let mut found = false;
            for channel in channels.iter().filter(|c| c.kind == kind && c.name == name) {
                found = true;
                let outcome = call("delete_channel", t, p.delete_channel(channel.id)).await;
                self.note(guild, name, outcome, &mut report);
            }
            if !found {
                report.skipped.push(missing(resource, name));
            }
        }

        info!(
            %guild,
            groups = report.groups,
            migrated = report.members_migrated,
            skipped = report.skipped.len(),
            ?policy,
            "semester decommissioned"
        );
        Ok(report)
    }

    /// The archive category, found by name or created on first use.
    async fn archive_category(
        &self,
        guild: GuildId,
        channels: &[ChannelInfo],
        cached: &mut Option<ChannelId>,
    ) -> Result<ChannelId, CourseError> {
        if let Some(id) = *cached {
            return Ok(id);
        }
        let name = &self.settings.archive_category;
        let id = match find_channel(channels, name, ChannelKind::Category) {
            Some(c) => c.id,
            None => call("create_category", self.timeout(), self.platform.create_category(guild, name)).await?,
        };
        *cached = Some(id);
        Ok(id)
    }

    fn note(&self, guild: GuildId, resource: &str, outcome: Result<(), CourseError>, report: &mut Decommissioned) {
        if let Err(e) = outcome {
            warn!(%guild, resource, error = %e, "teardown step failed");
            report.skipped.push(e);
        }
    }
}

fn missing(kind: ResourceKind, name: &str) -> CourseError {
    warn!(%kind, name, "resource missing, skipping");
    CourseError::ResourceNotFound { kind, name: name.to_string() }
}
