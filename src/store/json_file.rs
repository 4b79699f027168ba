//! `json` store: one pretty-printed document per guild.
//!
//! Layout: `{work_dir}/guilds/{guild_id}.json`.  Writes go to a `.tmp`
//! sibling first and are renamed into place, so a crash mid-write leaves the
//! previous document intact.  File I/O runs on the blocking pool.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use super::{GuildStore, StoreError};
use crate::model::{Guild, GuildId};

pub const GUILDS_DIR: &str = "guilds";

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open (or create) `{work_dir}/guilds/`.
    pub fn open(work_dir: &Path) -> Result<Self, StoreError> {
        let dir = work_dir.join(GUILDS_DIR);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(dir: &Path, id: GuildId) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    fn read_doc(dir: &Path, id: GuildId) -> Result<Option<Guild>, StoreError> {
        let path = Self::path_for(dir, id);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StoreError::Corrupt { guild: id, reason: e.to_string() })
    }

    fn write_doc(dir: &Path, guild: &Guild) -> Result<(), StoreError> {
        let path = Self::path_for(dir, guild.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(guild)
            .map_err(|e| StoreError::Corrupt { guild: guild.id, reason: e.to_string() })?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn list_docs(dir: &Path) -> Result<Vec<Guild>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<GuildId>().ok())
            else {
                warn!(path = %path.display(), "skipping unrecognised file in guild store");
                continue;
            };
            if let Some(guild) = Self::read_doc(dir, id)? {
                out.push(guild);
            }
        }
        out.sort_by_key(|g| g.id);
        Ok(out)
    }
}

async fn blocking<T, F>(op: &'static str, f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("{op} join: {e}")))?
}

#[async_trait]
impl GuildStore for JsonFileStore {
    fn kind(&self) -> &'static str {
        "json"
    }

    async fn get(&self, id: GuildId) -> Result<Option<Guild>, StoreError> {
        let dir = self.dir.clone();
        blocking("get", move || Self::read_doc(&dir, id)).await
    }

    async fn put(&self, guild: &Guild) -> Result<(), StoreError> {
        let dir = self.dir.clone();
        let guild = guild.clone();
        blocking("put", move || Self::write_doc(&dir, &guild)).await
    }

    async fn list(&self) -> Result<Vec<Guild>, StoreError> {
        let dir = self.dir.clone();
        blocking("list", move || Self::list_docs(&dir)).await
    }
}
