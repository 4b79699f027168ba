//! Builds the long-lived services from a resolved [`Config`].

use std::sync::Arc;

use tracing::info;

use crate::canvas::{CanvasClient, CourseDirectory};
use crate::commands::CommandContext;
use crate::config::Config;
use crate::error::AppError;
use crate::model::UserId;
use crate::palette::Palette;
use crate::platform::{self, Connected, PlatformError};
use crate::semester::SemesterService;
use crate::store::{self, GuildRepository};
use crate::supervisor::SupervisorContext;

pub struct Assembled {
    pub connected: Connected,
    pub service: Arc<SemesterService>,
    pub canvas: Option<Arc<dyn CourseDirectory>>,
    pub bot_user: UserId,
}

impl Assembled {
    pub fn supervisor_context(&self) -> SupervisorContext {
        SupervisorContext {
            commands: CommandContext { service: self.service.clone(), canvas: self.canvas.clone() },
            sandbox: self.connected.sandbox.clone(),
        }
    }
}

pub fn load_palette(config: &Config) -> Result<Palette, AppError> {
    match &config.palette_path {
        Some(path) => Palette::load(path),
        None => Ok(Palette::builtin()),
    }
}

fn canvas_directory(config: &Config) -> Result<Option<Arc<dyn CourseDirectory>>, AppError> {
    if !config.canvas.enabled {
        return Ok(None);
    }
    let token = config
        .canvas
        .token
        .clone()
        .ok_or_else(|| AppError::Config("CANVAS_TOKEN is required when canvas is enabled".into()))?;
    let client = CanvasClient::new(&config.canvas.base_url, token, config.platform.call_timeout)
        .map_err(|e| AppError::Config(e.to_string()))?;
    info!(base_url = %config.canvas.base_url, "canvas client ready");
    Ok(Some(Arc::new(client)))
}

/// Connect the platform, open the store and build the semester service.
pub async fn assemble(config: &Config) -> Result<Assembled, AppError> {
    std::fs::create_dir_all(&config.work_dir)?;

    let connected = platform::build(&config.platform, config.discord_token.as_deref())?;
    let bot_user = tokio::time::timeout(config.platform.call_timeout, connected.platform.current_user())
        .await
        .map_err(|_| PlatformError::Timeout)??;
    info!(%bot_user, platform = connected.kind(), "platform connected");

    let repo = GuildRepository::new(store::open(&config.store, &config.work_dir)?);
    let palette = load_palette(config)?;
    info!(emojis = palette.len(), "palette loaded");

    let service = SemesterService::new(
        connected.platform.clone(),
        repo,
        palette,
        config.semester.clone(),
        bot_user,
    );

    Ok(Assembled {
        connected,
        service: Arc::new(service),
        canvas: canvas_directory(config)?,
        bot_user,
    })
}
