//! Reaction dispatcher.
//!
//! Each event either resolves to a role change on one member or is
//! discarded.  Nothing here returns an error: reactions are a UI affordance
//! and a discarded event is only logged.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{SemesterService, call, group_role};
use crate::error::CourseError;
use crate::model::{Guild, GuildId, MessageId, RoleId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Added,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub kind: ReactionKind,
    pub guild_id: GuildId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscardReason {
    #[error("reaction by the bot itself")]
    OwnReaction,
    #[error("guild has no record")]
    UnknownGuild,
    #[error("guild has no tracking message")]
    NoTrackingMessage,
    #[error("not the tracking message")]
    OtherMessage,
    #[error("no group is bound to emoji {0}")]
    UnknownEmoji(String),
    #[error("role not found for group {0}")]
    RoleNotFound(String),
    #[error("member already holds the alumni role")]
    Alumni,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("platform call failed: {0}")]
    PlatformFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Granted { group: String, role: RoleId },
    Revoked { group: String, role: RoleId },
    Discarded(DiscardReason),
}

impl DispatchOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, DispatchOutcome::Discarded(_))
    }
}

impl From<CourseError> for DiscardReason {
    fn from(e: CourseError) -> Self {
        match e {
            CourseError::UnknownEmoji(emoji) => DiscardReason::UnknownEmoji(emoji),
            CourseError::RoleNotFound(group) => DiscardReason::RoleNotFound(group),
            CourseError::StoreUnavailable(e) => DiscardReason::StoreUnavailable(e.to_string()),
            other => DiscardReason::PlatformFailed(other.to_string()),
        }
    }
}

impl SemesterService {
    /// Resolve and apply one reaction event.
    pub async fn dispatch(&self, event: &ReactionEvent) -> DispatchOutcome {
        let outcome = self.resolve_and_apply(event).await;
        match &outcome {
            DispatchOutcome::Granted { group, role } => {
                info!(guild = %event.guild_id, user = %event.user_id, %group, %role, "role granted")
            }
            DispatchOutcome::Revoked { group, role } => {
                info!(guild = %event.guild_id, user = %event.user_id, %group, %role, "role revoked")
            }
            DispatchOutcome::Discarded(
                reason @ (DiscardReason::StoreUnavailable(_) | DiscardReason::PlatformFailed(_)),
            ) => warn!(guild = %event.guild_id, message = %event.message_id, %reason, "reaction dropped"),
            DispatchOutcome::Discarded(reason) => {
                debug!(guild = %event.guild_id, message = %event.message_id, %reason, "reaction discarded")
            }
        }
        outcome
    }

    async fn resolve_and_apply(&self, event: &ReactionEvent) -> DispatchOutcome {
        use DispatchOutcome::Discarded;

        if event.user_id == self.bot_user {
            return Discarded(DiscardReason::OwnReaction);
        }
        let record = match self.repo.load(event.guild_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Discarded(DiscardReason::UnknownGuild),
            Err(e) => return Discarded(CourseError::from(e).into()),
        };
        match record.role_message {
            None => return Discarded(DiscardReason::NoTrackingMessage),
            Some(m) if m != event.message_id => return Discarded(DiscardReason::OtherMessage),
            Some(_) => {}
        }

        self.apply(&record, event)
            .await
            .unwrap_or_else(|e| Discarded(e.into()))
    }

    /// Emoji to group, group to live role, then the role change itself.
    async fn apply(&self, record: &Guild, event: &ReactionEvent) -> Result<DispatchOutcome, CourseError> {
        let group = record
            .group_by_emoji(&event.emoji)
            .ok_or_else(|| CourseError::UnknownEmoji(event.emoji.clone()))?;

        let t = self.timeout();
        let guild = event.guild_id;
        let user = event.user_id;
        let roles = call("roles", t, self.platform.roles(guild)).await?;
        let role = group_role(&roles, group).ok_or_else(|| CourseError::RoleNotFound(group.name.clone()))?;

        if let Some(alumni) = roles.iter().find(|r| r.name == self.settings.alumni_role) {
            let held = call("member_roles", t, self.platform.member_roles(guild, user)).await?;
            if held.contains(&alumni.id) {
                return Ok(DispatchOutcome::Discarded(DiscardReason::Alumni));
            }
        }

        let name = group.name.clone();
        Ok(match event.kind {
            ReactionKind::Added => {
                call("add_member_role", t, self.platform.add_member_role(guild, user, role)).await?;
                DispatchOutcome::Granted { group: name, role }
            }
            ReactionKind::Removed => {
                call("remove_member_role", t, self.platform.remove_member_role(guild, user, role)).await?;
                DispatchOutcome::Revoked { group: name, role }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{BOT, Fixture, GUILD, fixture, fixture_with};
    use super::super::{DEFAULT_ALUMNI_ROLE, Provisioned, Reprovision, SemesterSettings};
    use super::*;
    use crate::model::Group;
    use crate::palette::Palette;
    use crate::platform::{Platform, PlatformError};
    use crate::store::GuildStore;

    const STUDENT: UserId = UserId(700);

    async fn active() -> (Fixture, Provisioned) {
        let f = fixture();
        let done = f.service.provision(GUILD, 3).await.unwrap();
        f.platform.add_member(GUILD, STUDENT);
        f.platform.clear_journal();
        (f, done)
    }

    fn event(kind: ReactionKind, done: &Provisioned, emoji: &str) -> ReactionEvent {
        ReactionEvent {
            kind,
            guild_id: GUILD,
            message_id: done.role_message,
            user_id: STUDENT,
            emoji: emoji.to_string(),
        }
    }

    #[tokio::test]
    async fn add_grants_and_remove_revokes() {
        let (f, done) = active().await;
        let g = &done.groups[0];
        let role = g.role_id.unwrap();

        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &g.emoji)).await;
        assert_eq!(outcome, DispatchOutcome::Granted { group: "group_1".into(), role });
        assert!(f.platform.member_has_role(GUILD, STUDENT, role));

        let outcome = f.service.dispatch(&event(ReactionKind::Removed, &done, &g.emoji)).await;
        assert_eq!(outcome, DispatchOutcome::Revoked { group: "group_1".into(), role });
        assert!(!f.platform.member_has_role(GUILD, STUDENT, role));
    }

    #[tokio::test]
    async fn bot_reactions_never_reach_the_platform() {
        let (f, done) = active().await;
        let mut ev = event(ReactionKind::Added, &done, &done.groups[0].emoji);
        ev.user_id = BOT;
        assert_eq!(f.service.dispatch(&ev).await, DispatchOutcome::Discarded(DiscardReason::OwnReaction));
        assert!(f.platform.ops().is_empty());
    }

    #[tokio::test]
    async fn other_messages_are_ignored() {
        let (f, done) = active().await;
        let mut ev = event(ReactionKind::Added, &done, &done.groups[0].emoji);
        ev.message_id = MessageId(done.role_message.get() + 1);
        assert_eq!(f.service.dispatch(&ev).await, DispatchOutcome::Discarded(DiscardReason::OtherMessage));
        assert!(f.platform.ops().is_empty());
    }

    #[tokio::test]
    async fn inactive_and_unknown_guilds_are_ignored() {
        let f = fixture();
        let ev = ReactionEvent {
            kind: ReactionKind::Added,
            guild_id: GUILD,
            message_id: MessageId(1),
            user_id: STUDENT,
            emoji: "🍎".into(),
        };
        assert_eq!(f.service.dispatch(&ev).await, DispatchOutcome::Discarded(DiscardReason::NoTrackingMessage));
        let other = ReactionEvent { guild_id: GuildId(1), ..ev };
        assert_eq!(f.service.dispatch(&other).await, DispatchOutcome::Discarded(DiscardReason::UnknownGuild));
    }

    #[tokio::test]
    async fn unknown_emoji_is_discarded() {
        let (f, done) = active().await;
        let unused = f
            .service
            .palette()
            .sample(25, &mut rand::thread_rng())
            .unwrap()
            .into_iter()
            .find(|e| done.groups.iter().all(|g| &g.emoji != e))
            .unwrap();
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &unused)).await;
        assert_eq!(outcome, DispatchOutcome::Discarded(DiscardReason::UnknownEmoji(unused)));
    }

    #[tokio::test]
    async fn deleted_role_is_discarded() {
        let (f, done) = active().await;
        let g = &done.groups[1];
        f.platform.delete_role(GUILD, g.role_id.unwrap()).await.unwrap();
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &g.emoji)).await;
        assert_eq!(outcome, DispatchOutcome::Discarded(DiscardReason::RoleNotFound("group_2".into())));
    }

    #[tokio::test]
    async fn alumni_are_not_regranted() {
        let (f, done) = active().await;
        let alumni = f.platform.seed_role(GUILD, DEFAULT_ALUMNI_ROLE);
        f.platform.add_member_role(GUILD, STUDENT, alumni).await.unwrap();
        let g = &done.groups[0];
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &g.emoji)).await;
        assert_eq!(outcome, DispatchOutcome::Discarded(DiscardReason::Alumni));
        assert!(!f.platform.member_has_role(GUILD, STUDENT, g.role_id.unwrap()));
    }

    #[tokio::test]
    async fn presentation_selector_does_not_matter() {
        let f = fixture();
        let mut guild = Guild::new(GUILD, "x");
        guild.start_semester(vec![Group::numbered(1, "⚓")], MessageId(9)).unwrap();
        f.store.put(&guild).await.unwrap();
        f.platform.seed_role(GUILD, "group_1");
        f.platform.add_member(GUILD, STUDENT);
        let ev = ReactionEvent {
            kind: ReactionKind::Added,
            guild_id: GUILD,
            message_id: MessageId(9),
            user_id: STUDENT,
            emoji: "⚓\u{fe0f}".into(),
        };
        assert!(f.service.dispatch(&ev).await.is_applied());
    }

    #[tokio::test]
    async fn parallel_cohort_reactions_grant_the_recorded_role() {
        let settings = SemesterSettings { reprovision: Reprovision::Parallel, ..SemesterSettings::default() };
        let f = fixture_with(Palette::builtin(), settings);
        let old = f.service.provision(GUILD, 1).await.unwrap();
        let current = f.service.provision(GUILD, 1).await.unwrap();
        f.platform.add_member(GUILD, STUDENT);

        let g = &current.groups[0];
        let role = g.role_id.unwrap();
        let old_role = old.groups[0].role_id.unwrap();
        assert_ne!(role, old_role);
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &current, &g.emoji)).await;
        assert_eq!(outcome, DispatchOutcome::Granted { group: "group_1".into(), role });
        assert!(!f.platform.member_has_role(GUILD, STUDENT, old_role));
    }

    #[tokio::test]
    async fn failed_grant_is_reported_as_platform_failure() {
        let (f, done) = active().await;
        f.platform.fail_next("add_member_role", PlatformError::Forbidden("hierarchy".into()));
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &done.groups[0].emoji)).await;
        assert!(matches!(outcome, DispatchOutcome::Discarded(DiscardReason::PlatformFailed(_))));
    }

    #[tokio::test]
    async fn store_outage_drops_the_event() {
        let (f, done) = active().await;
        f.store.fail_reads(true);
        let outcome = f.service.dispatch(&event(ReactionKind::Added, &done, &done.groups[0].emoji)).await;
        assert!(matches!(outcome, DispatchOutcome::Discarded(DiscardReason::StoreUnavailable(_))));
        assert!(f.platform.ops().is_empty());
    }
}
