//! Semester lifecycle: provisioning, decommissioning and reaction dispatch.
//!
//! [`SemesterService`] bundles what the three engines share: the platform
//! handle, the guild repository, the emoji palette and the settings.  The
//! engines themselves live in the submodules as `impl SemesterService`
//! blocks.

pub mod decommission;
pub mod provision;
pub mod reactions;

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;

use crate::error::CourseError;
use crate::palette::Palette;
use crate::model::{Group, RoleId, UserId};
use crate::platform::{Platform, PlatformError, RoleInfo};
use crate::store::GuildRepository;

pub use decommission::Decommissioned;
pub use provision::Provisioned;
pub use reactions::{DiscardReason, DispatchOutcome, ReactionEvent, ReactionKind};

/// Most groups one tracking message can list.
pub const MAX_GROUPS: usize = 25;

pub const ROLE_MESSAGE_TITLE: &str = "React to this post to get a role";
pub const ROLE_MESSAGE_COLOR: u32 = 0x2ecc71;

pub const DEFAULT_TEXT_CATEGORY: &str = "group_text_channels";
pub const DEFAULT_VOICE_CATEGORY: &str = "group_voice_channels";
pub const DEFAULT_ARCHIVE_CATEGORY: &str = "archived";
pub const DEFAULT_LANDING_CHANNEL: &str = "landing🛬";
pub const DEFAULT_ALUMNI_ROLE: &str = "Alumni";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// What happens to a group's channels and role at semester end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchivePolicy {
    /// Keep the text channel under the archive category and keep the role,
    /// both renamed with the year.
    Archive,
    #[default]
    Delete,
}

/// What `provision` does when the guild already has an active semester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reprovision {
    /// Provision a second cohort next to the first; the new tracking
    /// message replaces the old one.
    Parallel,
    #[default]
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemesterSettings {
    pub max_groups: usize,
    pub text_category: String,
    pub voice_category: String,
    pub archive_category: String,
    pub landing_channel: String,
    pub alumni_role: String,
    pub archive_policy: ArchivePolicy,
    pub reprovision: Reprovision,
    pub call_timeout: Duration,
}

impl Default for SemesterSettings {
    fn default() -> Self {
        Self {
            max_groups: MAX_GROUPS,
            text_category: DEFAULT_TEXT_CATEGORY.to_string(),
            voice_category: DEFAULT_VOICE_CATEGORY.to_string(),
            archive_category: DEFAULT_ARCHIVE_CATEGORY.to_string(),
            landing_channel: DEFAULT_LANDING_CHANNEL.to_string(),
            alumni_role: DEFAULT_ALUMNI_ROLE.to_string(),
            archive_policy: ArchivePolicy::default(),
            reprovision: Reprovision::default(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// Run one platform call under `timeout`.  Expiry is reported as
/// [`PlatformError::Timeout`] against `operation`.
pub async fn call<T, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T, CourseError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(cause)) => Err(CourseError::PlatformCallFailed { operation, cause }),
        Err(_) => Err(CourseError::PlatformCallFailed {
            operation,
            cause: PlatformError::Timeout,
        }),
    }
}

/// The live role backing `group`.  The recorded role id wins; the name is
/// only consulted when that role is gone, since a parallel cohort reuses
/// every group name.
pub fn group_role(roles: &[RoleInfo], group: &Group) -> Option<RoleId> {
    group
        .role_id
        .filter(|id| roles.iter().any(|r| r.id == *id))
        .or_else(|| roles.iter().find(|r| r.name == group.name).map(|r| r.id))
}

pub struct SemesterService {
    platform: Arc<dyn Platform>,
    repo: GuildRepository,
    palette: Palette,
    settings: SemesterSettings,
    bot_user: UserId,
    rng: Mutex<StdRng>,
}

impl SemesterService {
    pub fn new(
        platform: Arc<dyn Platform>,
        repo: GuildRepository,
        palette: Palette,
        settings: SemesterSettings,
        bot_user: UserId,
    ) -> Self {
        Self {
            platform,
            repo,
            palette,
            settings,
            bot_user,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Fix the emoji draw for reproducible runs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn repository(&self) -> &GuildRepository {
        &self.repo
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn settings(&self) -> &SemesterSettings {
        &self.settings
    }

    pub fn bot_user(&self) -> UserId {
        self.bot_user
    }

    fn timeout(&self) -> Duration {
        self.settings.call_timeout
    }

    fn draw_emojis(&self, count: usize) -> Result<Vec<String>, CourseError> {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        self.palette.sample(count, &mut *rng)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn call_maps_expiry_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, PlatformError>(())
        };
        match call("create_role", Duration::from_secs(1), slow).await {
            Err(CourseError::PlatformCallFailed { operation: "create_role", cause: PlatformError::Timeout }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_passes_through_platform_errors() {
        let failing = async { Err::<(), _>(PlatformError::NotFound("role".into())) };
        let err = call("delete_role", Duration::from_secs(1), failing).await.unwrap_err();
        assert!(matches!(
            err,
            CourseError::PlatformCallFailed { cause: PlatformError::NotFound(_), .. }
        ));
    }

    #[test]
    fn recorded_role_id_beats_a_same_named_role() {
        let roles = vec![
            RoleInfo { id: RoleId(10), name: "group_1".into() },
            RoleInfo { id: RoleId(20), name: "group_1".into() },
        ];
        let mut group = Group::numbered(1, "🍎");
        group.role_id = Some(RoleId(20));
        assert_eq!(group_role(&roles, &group), Some(RoleId(20)));

        group.role_id = Some(RoleId(99));
        assert_eq!(group_role(&roles, &group), Some(RoleId(10)));
        group.role_id = None;
        assert_eq!(group_role(&roles, &group), Some(RoleId(10)));
        assert_eq!(group_role(&roles[..0], &group), None);
    }

    #[test]
    fn policies_deserialize_lowercase() {
        #[derive(Deserialize)]
        struct Doc {
            archive: ArchivePolicy,
            reprovision: Reprovision,
        }
        let doc: Doc = toml::from_str("archive = \"archive\"\nreprovision = \"parallel\"").unwrap();
        assert_eq!(doc.archive, ArchivePolicy::Archive);
        assert_eq!(doc.reprovision, Reprovision::Parallel);
        assert!(toml::from_str::<Doc>("archive = \"shred\"\nreprovision = \"reject\"").is_err());
    }
}
