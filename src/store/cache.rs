//! Read-through / write-through cache in front of another [`GuildStore`].
//!
//! Entries are served from memory for `ttl` after they were last read or
//! written.  A zero `ttl` turns the cache off.  Writes made behind the
//! cache's back (another process sharing the backend) become visible once
//! the entry expires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::trace;

use super::{GuildStore, StoreError};
use crate::model::{Guild, GuildId};

pub struct CachedStore {
    inner: Arc<dyn GuildStore>,
    ttl: Duration,
    entries: Mutex<HashMap<GuildId, (Instant, Guild)>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn GuildStore>, ttl: Duration) -> Self {
        Self { inner, ttl, entries: Mutex::new(HashMap::new()) }
    }

    fn fresh(&self, id: GuildId) -> Option<Guild> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.lock().ok()?;
        let (at, guild) = entries.get(&id)?;
        (at.elapsed() < self.ttl).then(|| guild.clone())
    }

    fn remember(&self, guild: &Guild) {
        if self.ttl.is_zero() {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(guild.id, (Instant::now(), guild.clone()));
        }
    }

    fn forget(&self, id: GuildId) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&id);
        }
    }
}

#[async_trait]
impl GuildStore for CachedStore {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    async fn get(&self, id: GuildId) -> Result<Option<Guild>, StoreError> {
        if let Some(hit) = self.fresh(id) {
            trace!(guild = %id, "guild cache hit");
            return Ok(Some(hit));
        }
        let loaded = self.inner.get(id).await?;
        match &loaded {
            Some(guild) => self.remember(guild),
            None => self.forget(id),
        }
        Ok(loaded)
    }

    async fn put(&self, guild: &Guild) -> Result<(), StoreError> {
        match self.inner.put(guild).await {
            Ok(()) => {
                self.remember(guild);
                Ok(())
            }
            Err(e) => {
                // The backend state is unknown now.
                self.forget(guild.id);
                Err(e)
            }
        }
    }

    async fn list(&self) -> Result<Vec<Guild>, StoreError> {
        let all = self.inner.list().await?;
        for guild in &all {
            self.remember(guild);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn setup(ttl_secs: u64) -> (Arc<MemoryStore>, CachedStore) {
        let inner = Arc::new(MemoryStore::with_guilds([Guild::new(GuildId(1), "v1")]));
        let cached = CachedStore::new(inner.clone(), Duration::from_secs(ttl_secs));
        (inner, cached)
    }

    #[tokio::test(start_paused = true)]
    async fn serves_stale_value_inside_window() {
        let (inner, cached) = setup(30);
        assert_eq!(cached.get(GuildId(1)).await.unwrap().unwrap().name, "v1");
        inner.put(&Guild::new(GuildId(1), "v2")).await.unwrap();

        assert_eq!(cached.get(GuildId(1)).await.unwrap().unwrap().name, "v1");
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cached.get(GuildId(1)).await.unwrap().unwrap().name, "v2");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_always_reads_through() {
        let (inner, cached) = setup(0);
        cached.get(GuildId(1)).await.unwrap();
        inner.put(&Guild::new(GuildId(1), "v2")).await.unwrap();
        assert_eq!(cached.get(GuildId(1)).await.unwrap().unwrap().name, "v2");
    }

    #[tokio::test]
    async fn writes_go_through_and_refresh() {
        let (inner, cached) = setup(60);
        cached.put(&Guild::new(GuildId(1), "mine")).await.unwrap();
        assert_eq!(inner.get(GuildId(1)).await.unwrap().unwrap().name, "mine");
        inner.fail_reads(true);
        assert_eq!(cached.get(GuildId(1)).await.unwrap().unwrap().name, "mine");
    }

    #[tokio::test]
    async fn failed_write_drops_entry() {
        let (inner, cached) = setup(60);
        cached.get(GuildId(1)).await.unwrap();
        inner.fail_writes(true);
        assert!(cached.put(&Guild::new(GuildId(1), "lost")).await.is_err());
        inner.fail_reads(true);
        assert!(cached.get(GuildId(1)).await.is_err());
    }
}
