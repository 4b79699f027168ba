//! `sqlite` store: guild documents in a single SQLite table.
//!
//! Schema: `guilds(id INTEGER PRIMARY KEY, doc TEXT NOT NULL, updated_at TEXT)`.
//! The document column holds the same JSON as the `json` backend.  The
//! connection sits behind a mutex and every statement runs on the blocking
//! pool.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};

use super::{GuildStore, StoreError};
use crate::model::{Guild, GuildId};

pub const DB_FILE: &str = "guilds.sqlite3";

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn backend(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(format!("sqlite: {e}"))
}

impl SqliteStore {
    /// Open (or create) `{work_dir}/guilds.sqlite3`.
    pub fn open(work_dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(work_dir)?;
        let conn = Connection::open(work_dir.join(DB_FILE)).map_err(backend)?;
        conn.pragma_update(None, "journal_mode", "WAL").map_err(backend)?;
        conn.pragma_update(None, "busy_timeout", 5000).map_err(backend)?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS guilds (
                id INTEGER PRIMARY KEY,
                doc TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(backend)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".into()))?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("sqlite join: {e}")))?
    }
}

fn decode(id: GuildId, doc: &str) -> Result<Guild, StoreError> {
    serde_json::from_str(doc).map_err(|e| StoreError::Corrupt { guild: id, reason: e.to_string() })
}

// SQLite integers are signed; snowflakes fit in 63 bits.
fn key(id: GuildId) -> i64 {
    id.get() as i64
}

#[async_trait]
impl GuildStore for SqliteStore {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, id: GuildId) -> Result<Option<Guild>, StoreError> {
        self.with_conn(move |conn| {
            let doc: Option<String> = conn
                .query_row("SELECT doc FROM guilds WHERE id = ?1", params![key(id)], |row| row.get(0))
                .optional()
                .map_err(backend)?;
            doc.map(|d| decode(id, &d)).transpose()
        })
        .await
    }

    async fn put(&self, guild: &Guild) -> Result<(), StoreError> {
        let id = guild.id;
        let doc = serde_json::to_string(guild)
            .map_err(|e| StoreError::Corrupt { guild: id, reason: e.to_string() })?;
        self.with_conn(move |conn| {
            let now = chrono::Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO guilds (id, doc, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET doc = excluded.doc, updated_at = excluded.updated_at",
                params![key(id), doc, now],
            )
            .map_err(backend)?;
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Guild>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, doc FROM guilds ORDER BY id").map_err(backend)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
                .map_err(backend)?;
            let mut out = Vec::new();
            for row in rows {
                let (id, doc) = row.map_err(backend)?;
                out.push(decode(GuildId(id as u64), &doc)?);
            }
            Ok(out)
        })
        .await
    }
}
