//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! `TA_BOT_WORK_DIR` and `TA_BOT_LOG_LEVEL`.  Secrets never come from TOML:
//! `DISCORD_TOKEN` and `CANVAS_TOKEN` are read from the environment only, and
//! `CANVAS_URL` overrides `[canvas].base_url`.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::AppError;
use crate::semester::{self, ArchivePolicy, Reprovision, SemesterSettings};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// PTY (console) channel configuration.
#[derive(Debug, Clone)]
pub struct PtyConfig {
    pub enabled: bool,
}

/// HTTP intake configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to bind the listener to.
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct CommsConfig {
    pub pty: PtyConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Sandbox,
    Discord,
}

/// A guild the bot serves, registered at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildEntry {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub kind: PlatformKind,
    pub api_base_url: String,
    pub call_timeout: Duration,
    /// Bot user id used by the sandbox platform.
    pub sandbox_bot_user: u64,
    pub guilds: Vec<GuildEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Json,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Zero disables the cache.
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CanvasConfig {
    pub enabled: bool,
    pub base_url: String,
    /// From `CANVAS_TOKEN`.
    pub token: Option<String>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    /// Working directory for all persistent data (already expanded, no `~`).
    pub work_dir: PathBuf,
    pub log_level: String,
    pub platform: PlatformConfig,
    pub store: StoreConfig,
    pub semester: SemesterSettings,
    /// Emoji palette file; `None` uses the built-in palette.
    pub palette_path: Option<PathBuf>,
    pub comms: CommsConfig,
    pub canvas: CanvasConfig,
    /// From `DISCORD_TOKEN`.
    pub discord_token: Option<String>,
}

impl Config {
    pub fn comms_pty_should_load(&self) -> bool {
        self.comms.pty.enabled
    }

    pub fn comms_http_should_load(&self) -> bool {
        self.comms.http.enabled
    }
}

/// Values taken from the process environment.  Tests build this directly
/// instead of mutating env vars.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub work_dir: Option<String>,
    pub log_level: Option<String>,
    pub discord_token: Option<String>,
    pub canvas_url: Option<String>,
    pub canvas_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let var = |k: &str| env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            work_dir: var("TA_BOT_WORK_DIR"),
            log_level: var("TA_BOT_LOG_LEVEL"),
            discord_token: var("DISCORD_TOKEN"),
            canvas_url: var("CANVAS_URL"),
            canvas_token: var("CANVAS_TOKEN"),
        }
    }
}

/// Raw TOML shape, resolved into [`Config`].
#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    platform: RawPlatform,
    #[serde(default)]
    store: RawStore,
    #[serde(default)]
    semester: RawSemester,
    #[serde(default)]
    comms: RawComms,
    #[serde(default)]
    canvas: RawCanvas,
}

#[derive(Deserialize)]
struct RawSupervisor {
    bot_name: String,
    work_dir: String,
    log_level: String,
}

#[derive(Deserialize)]
struct RawPlatform {
    #[serde(default = "default_platform_kind")]
    kind: PlatformKind,
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_call_timeout_ms")]
    call_timeout_ms: u64,
    #[serde(default = "default_sandbox_bot_user")]
    sandbox_bot_user: u64,
    #[serde(default)]
    guilds: Vec<GuildEntry>,
}

impl Default for RawPlatform {
    fn default() -> Self {
        Self {
            kind: default_platform_kind(),
            api_base_url: default_api_base_url(),
            call_timeout_ms: default_call_timeout_ms(),
            sandbox_bot_user: default_sandbox_bot_user(),
            guilds: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct RawStore {
    #[serde(default = "default_store_backend")]
    backend: StoreBackend,
    #[serde(default)]
    cache_ttl_seconds: u64,
}

impl Default for RawStore {
    fn default() -> Self {
        Self { backend: default_store_backend(), cache_ttl_seconds: 0 }
    }
}

#[derive(Deserialize, Default)]
struct RawSemester {
    #[serde(default)]
    max_groups: Option<usize>,
    #[serde(default)]
    palette_path: Option<String>,
    #[serde(default)]
    archive_policy: ArchivePolicy,
    #[serde(default)]
    reprovision: Reprovision,
    #[serde(default)]
    text_category: Option<String>,
    #[serde(default)]
    voice_category: Option<String>,
    #[serde(default)]
    archive_category: Option<String>,
    #[serde(default)]
    landing_channel: Option<String>,
    #[serde(default)]
    alumni_role: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
    #[serde(default)]
    http: RawHttp,
}

#[derive(Deserialize)]
struct RawPty {
    /// Defaults to `true`; only takes effect with `-i`.
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Deserialize)]
struct RawHttp {
    /// Defaults to `false`: HTTP must be explicitly enabled.
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_http_bind")]
    bind: String,
}

impl Default for RawHttp {
    fn default() -> Self {
        Self { enabled: false, bind: default_http_bind() }
    }
}

#[derive(Deserialize, Default)]
struct RawCanvas {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    base_url: String,
}

fn default_platform_kind() -> PlatformKind { PlatformKind::Sandbox }
fn default_api_base_url() -> String { crate::platform::discord::DEFAULT_API_BASE_URL.to_string() }
fn default_call_timeout_ms() -> u64 { semester::DEFAULT_CALL_TIMEOUT.as_millis() as u64 }
fn default_sandbox_bot_user() -> u64 { 1 }
fn default_store_backend() -> StoreBackend { StoreBackend::Json }
fn default_http_bind() -> String { "127.0.0.1:8080".to_string() }
fn default_true() -> bool { true }

/// Load config from `path` (default `config/default.toml`), then apply
/// env-var overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    load_from(Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)), &EnvOverrides::from_env())
}

/// Load from an explicit path with explicit overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides).map_err(|e| match e {
        AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
        other => other,
    })
}

fn parse(raw: &str, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(raw).map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let s = parsed.supervisor;
    let work_dir = expand_home(overrides.work_dir.as_deref().unwrap_or(&s.work_dir));
    let log_level = overrides.log_level.clone().unwrap_or(s.log_level);

    let p = parsed.platform;
    if p.call_timeout_ms == 0 {
        return Err(AppError::Config("platform.call_timeout_ms must be positive".into()));
    }
    let call_timeout = Duration::from_millis(p.call_timeout_ms);

    let sem = parsed.semester;
    let max_groups = sem.max_groups.unwrap_or(semester::MAX_GROUPS);
    if max_groups == 0 || max_groups > semester::MAX_GROUPS {
        return Err(AppError::Config(format!(
            "semester.max_groups must be between 1 and {}, got {max_groups}",
            semester::MAX_GROUPS
        )));
    }
    let defaults = SemesterSettings::default();
    let semester = SemesterSettings {
        max_groups,
        text_category: sem.text_category.unwrap_or(defaults.text_category),
        voice_category: sem.voice_category.unwrap_or(defaults.voice_category),
        archive_category: sem.archive_category.unwrap_or(defaults.archive_category),
        landing_channel: sem.landing_channel.unwrap_or(defaults.landing_channel),
        alumni_role: sem.alumni_role.unwrap_or(defaults.alumni_role),
        archive_policy: sem.archive_policy,
        reprovision: sem.reprovision,
        call_timeout,
    };
    let palette_path = sem.palette_path.map(|raw| {
        let path = expand_home(&raw);
        if path.is_absolute() { path } else { work_dir.join(path) }
    });

    let canvas_base_url = overrides.canvas_url.clone().unwrap_or(parsed.canvas.base_url);
    if parsed.canvas.enabled && canvas_base_url.is_empty() {
        return Err(AppError::Config("canvas is enabled but no base_url or CANVAS_URL is set".into()));
    }

    Ok(Config {
        bot_name: s.bot_name,
        work_dir,
        log_level,
        platform: PlatformConfig {
            kind: p.kind,
            api_base_url: p.api_base_url,
            call_timeout,
            sandbox_bot_user: p.sandbox_bot_user,
            guilds: p.guilds,
        },
        store: StoreConfig {
            backend: parsed.store.backend,
            cache_ttl: Duration::from_secs(parsed.store.cache_ttl_seconds),
        },
        semester,
        palette_path,
        comms: CommsConfig {
            pty: PtyConfig { enabled: parsed.comms.pty.enabled },
            http: HttpConfig {
                enabled: parsed.comms.http.enabled,
                bind: parsed.comms.http.bind,
            },
        },
        canvas: CanvasConfig {
            enabled: parsed.canvas.enabled,
            base_url: canvas_base_url,
            token: overrides.canvas_token.clone(),
        },
        discord_token: overrides.discord_token.clone(),
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Sandbox platform, memory store, no secrets.
impl Config {
    pub fn test_default(work_dir: &Path) -> Self {
        Self {
            bot_name: "test".into(),
            work_dir: work_dir.to_path_buf(),
            log_level: "info".into(),
            platform: PlatformConfig {
                kind: PlatformKind::Sandbox,
                api_base_url: default_api_base_url(),
                call_timeout: Duration::from_secs(1),
                sandbox_bot_user: default_sandbox_bot_user(),
                guilds: Vec::new(),
            },
            store: StoreConfig { backend: StoreBackend::Memory, cache_ttl: Duration::ZERO },
            semester: SemesterSettings {
                call_timeout: Duration::from_secs(1),
                ..SemesterSettings::default()
            },
            palette_path: None,
            comms: CommsConfig {
                pty: PtyConfig { enabled: false },
                http: HttpConfig { enabled: false, bind: default_http_bind() },
            },
            canvas: CanvasConfig { enabled: false, base_url: String::new(), token: None },
            discord_token: None,
        }
    }
}
