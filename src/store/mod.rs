//! Guild persistence.
//!
//! [`GuildStore`] is the document-store seam: whole-record get/put/list keyed
//! by guild id.  Backends:
//!
//! - [`memory::MemoryStore`]: process-local map with failure injection.
//! - [`json_file::JsonFileStore`]: one `<id>.json` per guild under `work_dir/guilds/`.
//! - [`sqlite::SqliteStore`]: `guilds(id, doc)` table (feature `store-sqlite`).
//! - [`cache::CachedStore`]: read-through/write-through TTL decorator.
//!
//! Mutations go through [`GuildRepository`], which does read-modify-write on
//! the whole document.  Last writer wins.

pub mod cache;
pub mod json_file;
pub mod memory;
#[cfg(feature = "store-sqlite")]
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::AppError;
use crate::model::{CanvasCourse, Group, GroupConflict, Guild, GuildId, MessageId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record for guild {guild}: {reason}")]
    Corrupt { guild: GuildId, reason: String },

    #[error("rejected write: {0}")]
    Rejected(#[from] GroupConflict),

    #[error("guild {0} has no record")]
    Missing(GuildId),
}

/// Whole-document guild storage.
#[async_trait]
pub trait GuildStore: Send + Sync {
    /// Backend name for logs (`"memory"`, `"json"`, `"sqlite"`, ...).
    fn kind(&self) -> &'static str;

    async fn get(&self, id: GuildId) -> Result<Option<Guild>, StoreError>;

    /// Insert or replace the whole record.
    async fn put(&self, guild: &Guild) -> Result<(), StoreError>;

    /// All records, ordered by guild id.
    async fn list(&self) -> Result<Vec<Guild>, StoreError>;
}

// ── Repository ───────────────────────────────────────────────────────────────

/// Read-modify-write helpers over a [`GuildStore`].
#[derive(Clone)]
pub struct GuildRepository {
    store: Arc<dyn GuildStore>,
}

impl GuildRepository {
    pub fn new(store: Arc<dyn GuildStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.kind()
    }

    pub async fn load(&self, id: GuildId) -> Result<Option<Guild>, StoreError> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Result<Vec<Guild>, StoreError> {
        self.store.list().await
    }

    /// Make sure a record exists for `id`; returns the stored record.
    /// An existing record is never overwritten.
    pub async fn ensure_guild(&self, id: GuildId, name: &str) -> Result<Guild, StoreError> {
        if let Some(existing) = self.store.get(id).await? {
            return Ok(existing);
        }
        let guild = Guild::new(id, name);
        self.store.put(&guild).await?;
        info!(guild = %id, name, "registered guild");
        Ok(guild)
    }

    /// Record a freshly provisioned group set, replacing any previous one.
    /// Creates the record when the guild was never registered.
    pub async fn set_semester(
        &self,
        id: GuildId,
        groups: Vec<Group>,
        role_message: MessageId,
    ) -> Result<Guild, StoreError> {
        let mut guild = self
            .store
            .get(id)
            .await?
            .unwrap_or_else(|| Guild::new(id, String::new()));
        guild.start_semester(groups, role_message)?;
        self.store.put(&guild).await?;
        debug!(guild = %id, groups = guild.groups.len(), message = %role_message, "semester recorded");
        Ok(guild)
    }

    /// Clear groups and tracking message.  A missing record is not an error.
    pub async fn clear_semester(&self, id: GuildId) -> Result<(), StoreError> {
        let Some(mut guild) = self.store.get(id).await? else {
            return Ok(());
        };
        if guild.groups.is_empty() && guild.role_message.is_none() {
            return Ok(());
        }
        guild.end_semester();
        self.store.put(&guild).await?;
        debug!(guild = %id, "semester cleared");
        Ok(())
    }

    /// Shrink the active group set to `names`, keeping the tracking message.
    pub async fn retain_groups(&self, id: GuildId, names: &[String]) -> Result<(), StoreError> {
        let Some(mut guild) = self.store.get(id).await? else {
            return Ok(());
        };
        guild.retain_groups(names);
        self.store.put(&guild).await?;
        debug!(guild = %id, groups = guild.groups.len(), "semester narrowed");
        Ok(())
    }

    /// Track a Canvas course.  Returns `false` when the id was already tracked.
    pub async fn add_canvas_course(&self, id: GuildId, course: CanvasCourse) -> Result<bool, StoreError> {
        let mut guild = self.store.get(id).await?.ok_or(StoreError::Missing(id))?;
        if !guild.add_canvas_course(course) {
            return Ok(false);
        }
        self.store.put(&guild).await?;
        Ok(true)
    }
}

// ── Factory ──────────────────────────────────────────────────────────────────

/// Open the configured backend under `work_dir`, wrapped in a
/// [`cache::CachedStore`] when `cache_ttl` is non-zero.
pub fn open(config: &StoreConfig, work_dir: &std::path::Path) -> Result<Arc<dyn GuildStore>, AppError> {
    let base: Arc<dyn GuildStore> = match config.backend {
        StoreBackend::Memory => Arc::new(memory::MemoryStore::new()),
        StoreBackend::Json => Arc::new(json_file::JsonFileStore::open(work_dir)?),
        #[cfg(feature = "store-sqlite")]
        StoreBackend::Sqlite => Arc::new(sqlite::SqliteStore::open(work_dir)?),
        #[cfg(not(feature = "store-sqlite"))]
        StoreBackend::Sqlite => {
            return Err(AppError::Config(
                "store.backend = \"sqlite\" requires the store-sqlite feature".into(),
            ));
        }
    };
    info!(backend = base.kind(), cache_ttl_s = config.cache_ttl.as_secs(), "guild store open");
    if config.cache_ttl.is_zero() {
        Ok(base)
    } else {
        Ok(Arc::new(cache::CachedStore::new(base, config.cache_ttl)))
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryStore;
    use super::*;
    use crate::model::RoleId;
    use std::time::Duration;

    #[tokio::test]
    async fn open_builds_configured_backend() {
        let dir = tempfile::tempdir().unwrap();
        let json = open(&StoreConfig { backend: StoreBackend::Json, cache_ttl: Duration::ZERO }, dir.path()).unwrap();
        assert_eq!(json.kind(), "json");
        json.put(&Guild::new(GuildId(3), "x")).await.unwrap();
        assert!(dir.path().join("guilds").join("3.json").exists());

        let cached = open(&StoreConfig { backend: StoreBackend::Memory, cache_ttl: Duration::from_secs(5) }, dir.path()).unwrap();
        assert_eq!(cached.kind(), "memory");
    }

    fn repo() -> (Arc<MemoryStore>, GuildRepository) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), GuildRepository::new(store))
    }

    #[tokio::test]
    async fn ensure_guild_keeps_existing_record() {
        let (_, repo) = repo();
        let id = GuildId(1);
        repo.ensure_guild(id, "first").await.unwrap();
        repo.add_canvas_course(id, CanvasCourse { name: "INF-1100".into(), id: 9 })
            .await
            .unwrap();
        let again = repo.ensure_guild(id, "renamed").await.unwrap();
        assert_eq!(again.name, "first");
        assert_eq!(again.canvas_courses.len(), 1);
    }

    #[tokio::test]
    async fn canvas_courses_dedupe_by_id() {
        let (_, repo) = repo();
        let id = GuildId(2);
        repo.ensure_guild(id, "g").await.unwrap();
        let course = CanvasCourse { name: "INF-2200".into(), id: 42 };
        assert!(repo.add_canvas_course(id, course.clone()).await.unwrap());
        let renamed = CanvasCourse { name: "other".into(), id: 42 };
        assert!(!repo.add_canvas_course(id, renamed).await.unwrap());
        let stored = repo.load(id).await.unwrap().unwrap();
        assert_eq!(stored.canvas_courses, vec![course]);
    }

    #[tokio::test]
    async fn set_then_clear_semester() {
        let (_, repo) = repo();
        let id = GuildId(3);
        repo.ensure_guild(id, "g").await.unwrap();
        let mut group = Group::numbered(1, "🍎");
        group.role_id = Some(RoleId(50));
        repo.set_semester(id, vec![group], MessageId(77)).await.unwrap();
        assert!(repo.load(id).await.unwrap().unwrap().is_active());

        repo.clear_semester(id).await.unwrap();
        repo.clear_semester(id).await.unwrap();
        let stored = repo.load(id).await.unwrap().unwrap();
        assert!(stored.groups.is_empty());
        assert_eq!(stored.role_message, None);
    }

    #[tokio::test]
    async fn duplicate_groups_are_rejected_without_write() {
        let (_, repo) = repo();
        let id = GuildId(4);
        repo.ensure_guild(id, "g").await.unwrap();
        let groups = vec![Group::numbered(1, "🍎"), Group::numbered(2, "🍎")];
        let err = repo.set_semester(id, groups, MessageId(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected(GroupConflict::DuplicateEmoji(_))));
        assert!(!repo.load(id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn set_semester_creates_missing_record() {
        let (_, repo) = repo();
        repo.set_semester(GuildId(5), vec![Group::numbered(1, "🦀")], MessageId(1))
            .await
            .unwrap();
        assert_eq!(repo.load(GuildId(5)).await.unwrap().unwrap().role_message, Some(MessageId(1)));
    }

    #[tokio::test]
    async fn canvas_course_requires_record() {
        let (_, repo) = repo();
        let err = repo
            .add_canvas_course(GuildId(6), CanvasCourse { name: "x".into(), id: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Missing(GuildId(6))));
    }

    #[tokio::test]
    async fn retain_groups_narrows_the_semester() {
        let (_, repo) = repo();
        let groups = vec![Group::numbered(1, "🦀"), Group::numbered(2, "🐙")];
        repo.set_semester(GuildId(7), groups, MessageId(3)).await.unwrap();
        repo.retain_groups(GuildId(7), &["group_2".to_string()]).await.unwrap();
        let stored = repo.load(GuildId(7)).await.unwrap().unwrap();
        assert_eq!(stored.groups.len(), 1);
        assert!(stored.is_active());
        repo.retain_groups(GuildId(8), &[]).await.unwrap();
    }
}
