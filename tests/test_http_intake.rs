//! HTTP intake routes driven through a live supervisor on the sandbox.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use ta_bot::commands::{CommandContext, CommandRegistry};
use ta_bot::model::{GuildId, UserId};
use ta_bot::palette::Palette;
use ta_bot::platform::SandboxPlatform;
use ta_bot::semester::{SemesterService, SemesterSettings};
use ta_bot::store::GuildRepository;
use ta_bot::store::memory::MemoryStore;
use ta_bot::subsystems::comms::axum_channel::build_router;
use ta_bot::subsystems::comms::{CommsInfo, CommsState};
use ta_bot::supervisor::bus::SupervisorBus;
use ta_bot::supervisor::{self, SupervisorContext};

const GUILD: u64 = 4242;

struct Harness {
    router: Router,
    repo: GuildRepository,
    platform: Arc<SandboxPlatform>,
    shutdown: CancellationToken,
}

fn harness() -> Harness {
    let platform = Arc::new(SandboxPlatform::new(UserId(1)));
    let repo = GuildRepository::new(Arc::new(MemoryStore::new()));
    let service = SemesterService::new(
        platform.clone(),
        repo.clone(),
        Palette::builtin(),
        SemesterSettings::default(),
        UserId(1),
    )
    .with_seed(3);
    let ctx = SupervisorContext {
        commands: CommandContext { service: Arc::new(service), canvas: None },
        sandbox: Some(platform.clone()),
    };

    let bus = SupervisorBus::new(16);
    let (event_tx, _event_rx) = mpsc::channel(8);
    let info = CommsInfo { bot_name: "test-bot".into(), platform: "sandbox".into(), store: "memory".into() };
    let comms = Arc::new(CommsState::new(bus.handle.clone(), event_tx, info));
    let shutdown = CancellationToken::new();
    tokio::spawn(supervisor::run(bus, shutdown.clone(), ctx, CommandRegistry::builtin()));

    Harness { router: build_router("test", comms), repo, platform, shutdown }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

#[tokio::test]
async fn health_reports_wiring() {
    let h = harness();
    let (status, body) = send(&h.router, "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["bot_name"], "test-bot");
    assert_eq!(body["platform"], "sandbox");
    h.shutdown.cancel();
}

#[tokio::test]
async fn guild_command_and_reaction_round() {
    let h = harness();

    let (status, _) = send(&h.router, "POST", "/api/guilds", Some(json!({ "id": GUILD, "name": "INF-1100" }))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = send(
        &h.router,
        "POST",
        "/api/commands",
        Some(json!({ "name": "start_semester", "guild": GUILD, "args": ["2"], "admin": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["ok"], true);

    let record = h.repo.load(GuildId(GUILD)).await.unwrap().unwrap();
    assert_eq!(record.name, "INF-1100");
    let group = &record.groups[1];

    let (status, body) = send(
        &h.router,
        "POST",
        "/api/reactions",
        Some(json!({
            "kind": "added",
            "guild_id": GUILD,
            "message_id": record.role_message.unwrap().get(),
            "user_id": 777,
            "emoji": group.emoji,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["group"], "group_2");
    assert!(h.platform.member_has_role(GuildId(GUILD), UserId(777), group.role_id.unwrap()));

    let (_, body) = send(
        &h.router,
        "POST",
        "/api/reactions",
        Some(json!({ "kind": "added", "guild_id": GUILD, "message_id": 1, "user_id": 777, "emoji": group.emoji })),
    )
    .await;
    assert_eq!(body["applied"], false);
    assert_eq!(body["action"], "discarded");

    h.shutdown.cancel();
}

#[tokio::test]
async fn command_errors_map_to_status_codes() {
    let h = harness();

    let (status, body) = send(
        &h.router,
        "POST",
        "/api/commands",
        Some(json!({ "name": "end_semester", "guild": GUILD })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["ok"], false);

    let (status, _) = send(
        &h.router,
        "POST",
        "/api/commands",
        Some(json!({ "name": "start_semester", "guild": GUILD, "args": [], "admin": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.router,
        "POST",
        "/api/commands",
        Some(json!({ "name": "nope", "guild": GUILD, "admin": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.shutdown.cancel();
}

#[tokio::test]
async fn autocomplete_without_canvas_is_empty() {
    let h = harness();
    let (status, body) = send(
        &h.router,
        "GET",
        &format!("/api/commands/canvas_add_course/autocomplete?guild={GUILD}&partial=inf"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"], json!([]));

    let (status, _) = send(&h.router, "GET", &format!("/api/commands/nope/autocomplete?guild={GUILD}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    h.shutdown.cancel();
}
