//! A full term on the sandbox platform: provision, react, decommission.

use std::sync::Arc;

use ta_bot::model::{GuildId, UserId};
use ta_bot::palette::Palette;
use ta_bot::platform::{ChannelKind, Platform, SandboxPlatform};
use ta_bot::semester::{
    ArchivePolicy, DEFAULT_ALUMNI_ROLE, DispatchOutcome, ReactionEvent, ReactionKind, SemesterService,
    SemesterSettings,
};
use ta_bot::store::GuildRepository;
use ta_bot::store::memory::MemoryStore;

const GUILD: GuildId = GuildId(900);
const BOT: UserId = UserId(1);
const STUDENT: UserId = UserId(31337);

fn service(settings: SemesterSettings) -> (Arc<SandboxPlatform>, GuildRepository, SemesterService) {
    let platform = Arc::new(SandboxPlatform::new(BOT));
    platform.add_guild(GUILD);
    platform.add_member(GUILD, STUDENT);
    let repo = GuildRepository::new(Arc::new(MemoryStore::new()));
    let service = SemesterService::new(platform.clone(), repo.clone(), Palette::builtin(), settings, BOT).with_seed(7);
    (platform, repo, service)
}

#[tokio::test]
async fn term_with_delete_policy() {
    let (platform, repo, service) = service(SemesterSettings::default());

    let done = service.provision(GUILD, 3).await.unwrap();
    let names: Vec<&str> = done.groups.iter().map(|g| g.name.as_str()).collect();
    assert_eq!(names, ["group_1", "group_2", "group_3"]);
    let mut emojis: Vec<&str> = done.groups.iter().map(|g| g.emoji.as_str()).collect();
    assert!(emojis.iter().all(|e| service.palette().contains(e)));
    emojis.sort();
    emojis.dedup();
    assert_eq!(emojis.len(), 3);

    let message = platform.message(done.role_message).unwrap();
    assert_eq!(message.embed.fields.len(), 3);

    let record = repo.load(GUILD).await.unwrap().unwrap();
    assert_eq!(record.role_message, Some(done.role_message));
    assert_eq!(record.groups.len(), 3);

    let first = &record.groups[0];
    let outcome = service
        .dispatch(&ReactionEvent {
            kind: ReactionKind::Added,
            guild_id: GUILD,
            message_id: done.role_message,
            user_id: STUDENT,
            emoji: first.emoji.clone(),
        })
        .await;
    assert_eq!(outcome, DispatchOutcome::Granted { group: "group_1".into(), role: first.role_id.unwrap() });
    assert!(platform.member_has_role(GUILD, STUDENT, first.role_id.unwrap()));

    let ended = service.decommission(GUILD).await.unwrap();
    assert_eq!(ended.groups, 3);
    assert_eq!(ended.members_migrated, 1);

    let alumni = platform.role_named(GUILD, DEFAULT_ALUMNI_ROLE).unwrap();
    assert!(platform.member_has_role(GUILD, STUDENT, alumni));
    for name in ["group_1", "group_2", "group_3"] {
        assert!(platform.role_named(GUILD, name).is_none());
        assert!(platform.channel_named(GUILD, name, ChannelKind::Text).is_none());
        assert!(platform.channel_named(GUILD, name, ChannelKind::Voice).is_none());
    }

    let record = repo.load(GUILD).await.unwrap().unwrap();
    assert_eq!(record.role_message, None);
    assert!(record.groups.is_empty());
}

#[tokio::test]
async fn term_with_archive_policy_keeps_text_history() {
    let settings = SemesterSettings { archive_policy: ArchivePolicy::Archive, ..SemesterSettings::default() };
    let (platform, repo, service) = service(settings);

    service.provision(GUILD, 2).await.unwrap();
    let ended = service.decommission_in_year(GUILD, 2026).await.unwrap();
    assert!(ended.skipped.is_empty(), "skipped: {:?}", ended.skipped);

    let archived = platform.channel_named(GUILD, "2026_group_1", ChannelKind::Text).unwrap();
    let archive = platform.channel_named(GUILD, "archived", ChannelKind::Category).unwrap();
    assert_eq!(archived.parent, Some(archive.id));
    assert!(platform.channel_named(GUILD, "group_1", ChannelKind::Voice).is_none());
    assert!(platform.role_named(GUILD, "group_1_2026").is_some());
    let channels = platform.channels(GUILD).await.unwrap();
    assert!(channels.iter().all(|c| c.name != "landing🛬"));
    assert!(channels.iter().all(|c| c.name != "group_text_channels"));

    let record = repo.load(GUILD).await.unwrap().unwrap();
    assert_eq!(record.role_message, None);

    // A new term can start once the previous one is closed.
    assert!(service.provision(GUILD, 2).await.is_ok());
}

#[tokio::test]
async fn second_term_is_rejected_while_one_is_active() {
    let (platform, _repo, service) = service(SemesterSettings::default());
    service.provision(GUILD, 2).await.unwrap();
    let roles_before = platform.role_count(GUILD);
    let err = service.provision(GUILD, 2).await.unwrap_err();
    assert!(err.cause.is_input_error());
    assert_eq!(platform.role_count(GUILD), roles_before);
}
