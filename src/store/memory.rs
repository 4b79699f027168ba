//! In-process guild store.  Nothing survives a restart.
//!
//! Reads and writes can be switched to fail, which the engine tests use to
//! exercise `StoreUnavailable` paths.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{GuildStore, StoreError};
use crate::model::{Guild, GuildId};

#[derive(Default)]
pub struct MemoryStore {
    guilds: Mutex<BTreeMap<GuildId, Guild>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guilds(guilds: impl IntoIterator<Item = Guild>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.guilds.lock() {
            map.extend(guilds.into_iter().map(|g| (g.id, g)));
        }
        store
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `put` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<GuildId, Guild>>, StoreError> {
        self.guilds
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl GuildStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: GuildId) -> Result<Option<Guild>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn put(&self, guild: &Guild) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.lock()?.insert(guild.id, guild.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Guild>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(self.lock()?.values().cloned().collect())
    }
}
