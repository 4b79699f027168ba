//! ta-bot entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Connect the platform, open the store, build the semester service
//!   6. Start supervisor bus and spawn the Ctrl-C watcher
//!   7. Spawn supervisor run-loop and register configured guilds
//!   8. Run comms subsystem until shutdown
//!   9. Cancel token + join supervisor

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ta_bot::bootstrap::{self, Assembled};
use ta_bot::commands::CommandRegistry;
use ta_bot::config::{self, Config};
use ta_bot::error::AppError;
use ta_bot::logger;
use ta_bot::model::GuildId;
use ta_bot::subsystems::comms::{self, CommsInfo};
use ta_bot::supervisor::{self, bus::SupervisorBus};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // Optional file.
    let _ = dotenvy::dotenv();

    let args = parse_cli_args();

    let mut config = config::load(args.config_path.as_deref())?;

    // Without -i the console stays closed (daemon-safe default).
    if !args.interactive {
        config.comms.pty.enabled = false;
    }

    let effective_log_level = args.log_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, args.log_level.is_some())?;

    info!(
        bot_name = %config.bot_name,
        work_dir = %config.work_dir.display(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        interactive = %args.interactive,
        "config loaded"
    );

    let app = bootstrap::assemble(&config).await?;

    let shutdown = CancellationToken::new();
    let bus = SupervisorBus::new(64);
    let bus_handle = bus.handle.clone();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("ctrl-c received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let supervisor_task = tokio::spawn(supervisor::run(
        bus,
        shutdown.clone(),
        app.supervisor_context(),
        CommandRegistry::builtin(),
    ));

    for g in &config.platform.guilds {
        bus_handle
            .guild_available(GuildId(g.id), &g.name)
            .await
            .map_err(|e| AppError::Comms(e.to_string()))?;
    }

    let info = CommsInfo {
        bot_name: config.bot_name.clone(),
        platform: app.connected.kind().to_string(),
        store: app.service.repository().backend().to_string(),
    };
    let comms_handle = comms::start(&config, bus_handle, info, shutdown.clone());

    print_startup_summary(&config, &app, args.interactive);

    let comms_result = comms_handle.join().await;
    if let Err(e) = &comms_result {
        warn!("comms exited with error: {e}");
    } else if !args.interactive {
        shutdown.cancelled().await;
    }

    shutdown.cancel();
    if let Err(e) = supervisor_task.await {
        warn!("supervisor task ended abnormally: {e}");
    }
    info!("bye");
    comms_result
}

fn print_startup_summary(config: &Config, app: &Assembled, interactive: bool) {
    let fit = |text: String| -> String {
        const WIDTH: usize = 58;
        let char_count = text.chars().count();
        if char_count >= WIDTH {
            let mut out = text.chars().take(WIDTH - 1).collect::<String>();
            out.push('…');
            out
        } else {
            format!("{text:<WIDTH$}")
        }
    };

    let mode_text = if interactive { "interactive" } else { "daemon" };
    let platform_line = format!("{} (bot user {})", app.connected.kind(), app.bot_user);
    let store_line = if config.store.cache_ttl.is_zero() {
        app.service.repository().backend().to_string()
    } else {
        format!("{} + cache {}s", app.service.repository().backend(), config.store.cache_ttl.as_secs())
    };
    let semester = &config.semester;
    let semester_line = format!(
        "max {} groups, end: {:?}, restart: {:?}",
        semester.max_groups, semester.archive_policy, semester.reprovision
    )
    .to_lowercase();
    let guilds_line = if config.platform.guilds.is_empty() {
        "none configured".to_string()
    } else {
        config
            .platform
            .guilds
            .iter()
            .map(|g| if g.name.is_empty() { g.id.to_string() } else { format!("{} ({})", g.name, g.id) })
            .collect::<Vec<_>>()
            .join(", ")
    };
    let canvas_line = if app.canvas.is_some() { config.canvas.base_url.clone() } else { "disabled".to_string() };

    let mut comms_lines = Vec::new();
    #[cfg(feature = "channel-pty")]
    comms_lines.push(format!("⌨️  pty: {}", if config.comms.pty.enabled { "enabled" } else { "disabled" }));
    #[cfg(feature = "channel-axum")]
    comms_lines.push(if config.comms.http.enabled {
        format!("🌐 http: {}", config.comms.http.bind)
    } else {
        "🌐 http: disabled".to_string()
    });
    #[cfg(not(feature = "channel-axum"))]
    if config.comms.http.enabled {
        comms_lines.push("🌐 http: configured but not compiled in".to_string());
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ 🎓 ta-bot status                                             ║");
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 🧾 Bot: {:<52}║", config.bot_name);
    println!("║ 🧠 PID: {:<52}║", std::process::id());
    println!("║ 🛰️  Mode: {:<51}║", mode_text);
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║   {}║", fit(format!("🔌 platform: {platform_line}")));
    println!("║   {}║", fit(format!("🗄️  store: {store_line}")));
    println!("║   {}║", fit(format!("📚 semester: {semester_line}")));
    println!("║   {}║", fit(format!("🏫 guilds: {guilds_line}")));
    println!("║   {}║", fit(format!("🎒 canvas: {canvas_line}")));
    println!("╟──────────────────────────────────────────────────────────────╢");
    println!("║ 📡 Comms                                                     ║");
    for line in comms_lines {
        println!("║   {}║", fit(line));
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    if interactive {
        println!("💡 Type /help for help");
    }
}

struct CliArgs {
    log_level: Option<&'static str>,
    interactive: bool,
    config_path: Option<String>,
}

fn parse_cli_args() -> CliArgs {
    let mut verbosity = 0u8;
    let mut interactive = false;
    let mut config_path = None;

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--" {
            break;
        }

        match arg.as_str() {
            "-h" | "--help" => {
                println!("Usage: ta-bot [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -h, --help                 Print help");
                println!("  -i, --interactive          Run in interactive mode (enables the console)");
                println!("  -c, -f, --config <PATH>    Path to configuration file (default: config/default.toml)");
                println!("  -v, -vv, -vvv, -vvvv       Increase logging verbosity");
                std::process::exit(0);
            }
            "-i" | "--interactive" => interactive = true,
            "-c" | "-f" | "--config" => {
                if let Some(path) = iter.next() {
                    config_path = Some(path);
                } else {
                    eprintln!("error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--verbose" => verbosity = verbosity.saturating_add(1),
            a if a.starts_with('-') && a.len() > 1 && a.chars().skip(1).all(|c| c == 'v') => {
                verbosity = verbosity.saturating_add((a.len() - 1) as u8);
            }
            _ => {}
        }
    }

    CliArgs { log_level: logger::level_for_verbosity(verbosity), interactive, config_path }
}
